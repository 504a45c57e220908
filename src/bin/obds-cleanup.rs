/// oBDS cleanup worker - consumes report records from NATS, cleans them up and
/// republishes them to the output subject.

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use obds_cleanup::{health, CleanupError, Config, NatsClient, Pipeline};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::parse();

    if let Err(e) = run(config).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), CleanupError> {
    config.validate()?;

    let topics = config.subscribed_topics();
    let features = config.features();
    tracing::info!(
        "Starting obds-cleanup: {:?} -> '{}' (remove_patient_id_leading_zeros={}, drop_non_obds2={})",
        topics,
        config.output_topic,
        features.remove_patient_id_leading_zeros,
        features.drop_non_obds2
    );

    let nats = NatsClient::connect(&config.bootstrap_servers, &config.consumer_group).await?;
    let pipeline = Pipeline::from_config(&config);

    if let Some(port) = config.health_port {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let stats = pipeline.stats();
        let connection = nats.connection();
        tokio::spawn(async move {
            if let Err(e) = health::serve(listener, stats, connection).await {
                tracing::error!("Health endpoint stopped: {}", e);
            }
        });
    }

    let mut sink = nats.sink();
    let mut source = nats
        .subscribe(&config.stream_name, &topics, &config.consumer_group)
        .await?;

    let result = obds_cleanup::run(
        &pipeline,
        &mut source,
        &mut sink,
        config.poll_interval(),
        shutdown_signal(),
    )
    .await;

    let stats = pipeline.stats().snapshot();
    tracing::info!(
        "Processed {} messages: {} forwarded ({} passed through unchanged), {} dropped",
        stats.received,
        stats.forwarded(),
        stats.passed_through,
        stats.dropped
    );

    result.map_err(CleanupError::from)
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
