/// Transport-agnostic bus message and poll event
///
/// The pipeline only sees these types; the concrete bus client converts its
/// own message representation at the boundary.

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was received from, or is destined for
    pub topic: String,

    /// Opaque message key, passed through unchanged
    pub key: Option<Vec<u8>>,

    /// Raw message value
    pub value: Vec<u8>,

    /// Transport headers other than the key, in a stable order
    pub headers: Vec<(String, String)>,
}

impl BusMessage {
    /// Create a new message
    pub fn new(topic: impl Into<String>, key: Option<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key,
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Attach a header, keeping any earlier values of the same name
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Point the message at another topic, returning the previous one
    pub fn retarget(&mut self, topic: &str) -> String {
        std::mem::replace(&mut self.topic, topic.to_string())
    }
}

/// Result of a single poll on the inbound side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Message(BusMessage),
    /// Transport failure; ends the consumer loop
    Error(TransportError),
    /// Poll interval elapsed without a message
    Empty,
}
