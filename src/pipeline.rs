//! Per-message control flow and the consumer loop.
//!
//! Every inbound message is re-targeted to the output topic, decoded, run
//! through the feature policy and re-encoded. Data errors never stop the loop:
//! a message that cannot be decoded or re-encoded is forwarded as it came in.
//! Transport errors end the loop.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::bus::{BusEvent, BusMessage, MessageSink, MessageSource};
use crate::config::Config;
use crate::error::TransportError;
use crate::policy::{FeaturePolicy, Verdict};
use crate::record::Record;

/// What happened to a single inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Decoded, policy applied and re-encoded
    Transformed(BusMessage),
    /// Forwarded with its original value
    PassThrough(BusMessage),
    /// Rejected by the policy; nothing is forwarded
    Dropped,
}

impl Disposition {
    /// The message to forward, if any
    pub fn into_outbound(self) -> Option<BusMessage> {
        match self {
            Disposition::Transformed(message) | Disposition::PassThrough(message) => Some(message),
            Disposition::Dropped => None,
        }
    }
}

/// Message counters, readable while the loop runs
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    transformed: AtomicU64,
    passed_through: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub transformed: u64,
    pub passed_through: u64,
    pub dropped: u64,
}

impl StatsSnapshot {
    pub fn forwarded(&self) -> u64 {
        self.transformed + self.passed_through
    }
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, disposition: &Disposition) {
        let counter = match disposition {
            Disposition::Transformed(_) => &self.transformed,
            Disposition::PassThrough(_) => &self.passed_through,
            Disposition::Dropped => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Processes inbound messages one at a time
pub struct Pipeline {
    policy: FeaturePolicy,
    output_topic: String,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(policy: FeaturePolicy, output_topic: impl Into<String>) -> Self {
        Self {
            policy,
            output_topic: output_topic.into(),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(FeaturePolicy::new(config.features()), config.output_topic.trim())
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Decide the fate of one inbound message
    pub fn process(&self, message: BusMessage) -> Disposition {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let disposition = self.dispose(message);
        self.stats.record(&disposition);
        disposition
    }

    fn dispose(&self, mut message: BusMessage) -> Disposition {
        let source_topic = message.retarget(&self.output_topic);

        let mut record = match Record::decode(&message.value) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(topic = %source_topic, "Forwarding message unchanged: {}", e);
                return Disposition::PassThrough(message);
            }
        };

        let modified = match self.policy.apply(&mut record) {
            Verdict::Drop => {
                tracing::debug!(topic = %source_topic, id = record.payload.id, "Dropping non oBDS 2.x record");
                return Disposition::Dropped;
            }
            Verdict::Keep { modified } => modified,
        };

        match record.encode() {
            Ok(value) => {
                tracing::debug!(topic = %source_topic, id = record.payload.id, modified, "Record processed");
                message.value = value;
                Disposition::Transformed(message)
            }
            Err(e) => {
                tracing::warn!(topic = %source_topic, id = record.payload.id, "Forwarding message unchanged: {}", e);
                Disposition::PassThrough(message)
            }
        }
    }
}

/// Run the consumer loop until `shutdown` resolves or the transport fails.
///
/// One message is fully processed, handed to the sink and acknowledged on the
/// source before the next poll. The sink is flushed once when the loop ends.
pub async fn run<S, K, F>(
    pipeline: &Pipeline,
    source: &mut S,
    sink: &mut K,
    poll_interval: Duration,
    shutdown: F,
) -> Result<(), TransportError>
where
    S: MessageSource,
    K: MessageSink,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let result = loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping consumer loop");
                break Ok(());
            }
            event = source.poll(poll_interval) => event,
        };

        match event {
            BusEvent::Message(message) => {
                if let Some(outbound) = pipeline.process(message).into_outbound() {
                    if let Err(e) = sink.produce(outbound).await {
                        tracing::error!("Failed to forward message: {}", e);
                        break Err(e);
                    }
                }
                // Dropped messages are acknowledged too, so they are not redelivered
                if let Err(e) = source.commit().await {
                    tracing::error!("Failed to acknowledge message: {}", e);
                    break Err(e);
                }
            }
            BusEvent::Error(e) => {
                tracing::error!("Transport error: {}", e);
                break Err(e);
            }
            BusEvent::Empty => {}
        }
    };

    let flushed = sink.flush().await;
    if let Err(e) = &flushed {
        tracing::warn!("Failed to flush outbound messages: {}", e);
    }

    result.and(flushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemorySink, MemorySource};
    use crate::policy::FeatureFlags;

    const RECORD: &str = concat!(
        r#"{"schema":{"type":"struct","fields":[],"optional":false},"#,
        r#""payload":{"YEAR":2024,"VERSIONSNUMMER":1,"ID":9,"#,
        r#""XML_DATEN":"<ADT_GEKID Schema_Version=\"2.2.3\"><Patient Patient_ID=\"0009\"/></ADT_GEKID>"}}"#,
        "\n"
    );

    const OBDS3_RECORD: &str = concat!(
        r#"{"schema":{"type":"struct","fields":[],"optional":false},"#,
        r#""payload":{"YEAR":2024,"VERSIONSNUMMER":1,"ID":10,"#,
        r#""XML_DATEN":"<oBDS Schema_Version=\"3.0.3\"><Patient Patient_ID=\"0010\"/></oBDS>"}}"#,
        "\n"
    );

    fn pipeline(flags: FeatureFlags) -> Pipeline {
        Pipeline::new(FeaturePolicy::new(flags), "obds.clean")
    }

    fn inbound(value: &str) -> BusMessage {
        BusMessage::new("obds.raw", Some(b"key-1".to_vec()), value.as_bytes().to_vec())
    }

    #[test]
    fn test_transforms_record() {
        let pipeline = pipeline(FeatureFlags::default());

        let Disposition::Transformed(message) = pipeline.process(inbound(RECORD)) else {
            panic!("expected transformed message");
        };

        assert_eq!(message.topic, "obds.clean");
        assert_eq!(message.key.as_deref(), Some(&b"key-1"[..]));
        assert_eq!(
            String::from_utf8(message.value).unwrap(),
            RECORD.replace(r#"Patient_ID=\"0009\""#, r#"Patient_ID=\"9\""#)
        );
    }

    #[test]
    fn test_malformed_value_passes_through() {
        let pipeline = pipeline(FeatureFlags::default());
        let original = inbound("not json <Patient Patient_ID=\"007\"/>");

        let disposition = pipeline.process(original.clone());

        let Disposition::PassThrough(message) = disposition else {
            panic!("expected pass-through");
        };
        assert_eq!(message.topic, "obds.clean");
        assert_eq!(message.key, original.key);
        assert_eq!(message.value, original.value);
    }

    #[test]
    fn test_drops_non_obds2_when_enabled() {
        let pipeline = pipeline(FeatureFlags {
            remove_patient_id_leading_zeros: true,
            drop_non_obds2: true,
        });

        assert_eq!(pipeline.process(inbound(OBDS3_RECORD)), Disposition::Dropped);
        assert!(matches!(pipeline.process(inbound(RECORD)), Disposition::Transformed(_)));
    }

    #[test]
    fn test_keeps_non_obds2_by_default() {
        let pipeline = pipeline(FeatureFlags::default());
        assert!(matches!(
            pipeline.process(inbound(OBDS3_RECORD)),
            Disposition::Transformed(_)
        ));
    }

    #[test]
    fn test_stats() {
        let pipeline = pipeline(FeatureFlags {
            remove_patient_id_leading_zeros: true,
            drop_non_obds2: true,
        });

        pipeline.process(inbound(RECORD));
        pipeline.process(inbound(OBDS3_RECORD));
        pipeline.process(inbound("{}"));

        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.transformed, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.passed_through, 1);
        assert_eq!(stats.forwarded(), 2);
    }

    #[test]
    fn test_into_outbound() {
        let message = inbound(RECORD);

        assert_eq!(Disposition::Transformed(message.clone()).into_outbound(), Some(message.clone()));
        assert_eq!(Disposition::PassThrough(message.clone()).into_outbound(), Some(message));
        assert_eq!(Disposition::Dropped.into_outbound(), None);
    }

    #[tokio::test]
    async fn test_run_forwards_in_order() {
        let pipeline = pipeline(FeatureFlags {
            remove_patient_id_leading_zeros: true,
            drop_non_obds2: true,
        });
        let mut source = MemorySource::new();
        source.push(BusEvent::Message(inbound(RECORD)));
        source.push(BusEvent::Empty);
        source.push(BusEvent::Message(inbound(OBDS3_RECORD)));
        source.push(BusEvent::Message(inbound("garbage")));
        let mut sink = MemorySink::new();

        let result = run(
            &pipeline,
            &mut source,
            &mut sink,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;

        assert_eq!(result, Err(TransportError::Closed));
        assert_eq!(sink.produced().len(), 2);
        assert!(sink.produced().iter().all(|m| m.topic == "obds.clean"));
        assert_eq!(sink.produced()[1].value, b"garbage");
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(source.committed(), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_transport_error() {
        let pipeline = pipeline(FeatureFlags::default());
        let mut source = MemorySource::new();
        source.push(BusEvent::Error(TransportError::Client("connection lost".to_string())));
        source.push(BusEvent::Message(inbound(RECORD)));
        let mut sink = MemorySink::new();

        let result = run(
            &pipeline,
            &mut source,
            &mut sink,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;

        assert_eq!(result, Err(TransportError::Client("connection lost".to_string())));
        assert!(sink.produced().is_empty());
        assert_eq!(source.remaining(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_publish_failure() {
        let pipeline = pipeline(FeatureFlags::default());
        let mut source = MemorySource::from_messages(vec![inbound(RECORD), inbound(RECORD)]);
        let mut sink = MemorySink::failing(TransportError::Publish("no route".to_string()));

        let result = run(
            &pipeline,
            &mut source,
            &mut sink,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;

        assert_eq!(result, Err(TransportError::Publish("no route".to_string())));
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.committed(), 0);
    }

    #[tokio::test]
    async fn test_run_acknowledges_dropped_messages() {
        let pipeline = pipeline(FeatureFlags {
            remove_patient_id_leading_zeros: true,
            drop_non_obds2: true,
        });
        let mut source = MemorySource::from_messages(vec![inbound(OBDS3_RECORD), inbound(OBDS3_RECORD)]);
        let mut sink = MemorySink::new();

        let _ = run(
            &pipeline,
            &mut source,
            &mut sink,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;

        assert!(sink.produced().is_empty());
        assert_eq!(source.committed(), 2);
    }

    #[test]
    fn test_headers_survive_processing() {
        let pipeline = pipeline(FeatureFlags::default());

        for value in [RECORD, "not json"] {
            let message = inbound(value)
                .with_header("trace-id", "t-1")
                .with_header("source", "lkr");

            let outbound = pipeline.process(message).into_outbound().unwrap();

            assert_eq!(outbound.key.as_deref(), Some(&b"key-1"[..]));
            assert_eq!(
                outbound.headers,
                vec![
                    ("trace-id".to_string(), "t-1".to_string()),
                    ("source".to_string(), "lkr".to_string()),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_run_honours_shutdown() {
        let pipeline = pipeline(FeatureFlags::default());
        let mut source = MemorySource::from_messages(vec![inbound(RECORD)]);
        let mut sink = MemorySink::new();

        let result = run(
            &pipeline,
            &mut source,
            &mut sink,
            Duration::from_millis(10),
            std::future::ready(()),
        )
        .await;

        assert_eq!(result, Ok(()));
        assert!(sink.produced().is_empty());
        assert_eq!(sink.flush_count(), 1);
    }
}
