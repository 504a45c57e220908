//! Startup configuration.
//!
//! Every option can be given on the command line or through the environment.
//! The configuration is parsed once and then only read.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::error::ConfigError;
use crate::policy::FeatureFlags;

#[derive(Debug, Clone, Parser)]
#[command(name = "obds-cleanup")]
#[command(version, about = "A simple pipeline step to clean up incoming oBDS report messages", long_about = None)]
pub struct Config {
    /// Bus server URL(s), comma separated
    #[arg(long, env = "BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: String,

    /// Input topic(s), comma separated
    #[arg(long, env = "INPUT_TOPICS")]
    pub input_topics: String,

    /// Output topic
    #[arg(long, env = "OUTPUT_TOPIC")]
    pub output_topic: String,

    /// Persistent stream holding the input topics; created when missing
    #[arg(long, env = "NATS_STREAM", default_value = "OBDS")]
    pub stream_name: String,

    /// Consumer group shared by all instances of this step
    #[arg(long, env = "CONSUMER_GROUP", default_value = "obds-cleanup")]
    pub consumer_group: String,

    /// Strip leading zeros from Patient_ID attributes
    #[arg(
        long,
        env = "REMOVE_PATIENT_ID_LEADING_ZEROS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub remove_patient_id_leading_zeros: bool,

    /// Drop records that are not oBDS 2.x documents
    #[arg(
        long,
        env = "DROP_NON_OBDS2",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub drop_non_obds2: bool,

    /// Maximum time a single poll waits for a message, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Serve /health and /ready on this port
    #[arg(long, env = "HEALTH_PORT")]
    pub health_port: Option<u16>,
}

impl Config {
    /// Input topics split on commas, trimmed, empty entries skipped
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.input_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn features(&self) -> FeatureFlags {
        FeatureFlags {
            remove_patient_id_leading_zeros: self.remove_patient_id_leading_zeros,
            drop_non_obds2: self.drop_non_obds2,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscribed_topics().is_empty() {
            return Err(ConfigError::NoInputTopics);
        }
        if self.output_topic.trim().is_empty() {
            return Err(ConfigError::EmptyOutputTopic);
        }
        if self.consumer_group.trim().is_empty() {
            return Err(ConfigError::EmptyConsumerGroup);
        }
        if self.stream_name.trim().is_empty() {
            return Err(ConfigError::EmptyStreamName);
        }
        Ok(())
    }
}
