//! Error types for the cleanup pipeline.
//!
//! Data-level errors (`CodecError`) are recovered inside the pipeline by
//! forwarding the original bytes. Transport and configuration errors end the
//! process.

use std::fmt;

/// Error type for envelope decoding and encoding
#[derive(Debug)]
pub enum CodecError {
    /// The bytes are not a structurally valid envelope
    MalformedInput(serde_json::Error),
    /// A decoded record could not be serialized again
    EncodingFailure(serde_json::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MalformedInput(e) => write!(f, "Malformed input: {}", e),
            CodecError::EncodingFailure(e) => write!(f, "Encoding failure: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::MalformedInput(e) | CodecError::EncodingFailure(e) => Some(e),
        }
    }
}

/// Error type for message bus operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Connect(String),
    Subscribe(String),
    Publish(String),
    Flush(String),
    Ack(String),
    /// Error event reported by the bus client while the loop was running
    Client(String),
    /// All inbound subscriptions have ended
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            TransportError::Subscribe(msg) => write!(f, "Subscription failed: {}", msg),
            TransportError::Publish(msg) => write!(f, "Publish failed: {}", msg),
            TransportError::Flush(msg) => write!(f, "Flush failed: {}", msg),
            TransportError::Ack(msg) => write!(f, "Acknowledgement failed: {}", msg),
            TransportError::Client(msg) => write!(f, "Bus client error: {}", msg),
            TransportError::Closed => write!(f, "Inbound subscriptions closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Error type for startup configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoInputTopics,
    EmptyOutputTopic,
    EmptyConsumerGroup,
    EmptyStreamName,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoInputTopics => write!(f, "At least one input topic is required"),
            ConfigError::EmptyOutputTopic => write!(f, "Output topic must not be empty"),
            ConfigError::EmptyConsumerGroup => write!(f, "Consumer group must not be empty"),
            ConfigError::EmptyStreamName => write!(f, "Stream name must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level error returned to the process boundary
#[derive(Debug)]
pub enum CleanupError {
    Config(ConfigError),
    Transport(TransportError),
    Io(std::io::Error),
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupError::Config(e) => write!(f, "Configuration error: {}", e),
            CleanupError::Transport(e) => write!(f, "Transport error: {}", e),
            CleanupError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CleanupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CleanupError::Config(e) => Some(e),
            CleanupError::Transport(e) => Some(e),
            CleanupError::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CleanupError {
    fn from(err: ConfigError) -> Self {
        CleanupError::Config(err)
    }
}

impl From<TransportError> for CleanupError {
    fn from(err: TransportError) -> Self {
        CleanupError::Transport(err)
    }
}

impl From<std::io::Error> for CleanupError {
    fn from(err: std::io::Error) -> Self {
        CleanupError::Io(err)
    }
}
