//! In-memory bus used by tests and local runs.

use std::collections::VecDeque;
use std::time::Duration;

use super::{BusEvent, BusMessage, MessageSink, MessageSource};
use crate::error::TransportError;

/// Replays a fixed sequence of events.
///
/// Once drained it reports [`TransportError::Closed`], like a bus whose
/// subscriptions have ended.
#[derive(Debug, Default)]
pub struct MemorySource {
    events: VecDeque<BusEvent>,
    delivered: usize,
    committed: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source that yields the given messages in order
    pub fn from_messages(messages: impl IntoIterator<Item = BusMessage>) -> Self {
        Self {
            events: messages.into_iter().map(BusEvent::Message).collect(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, event: BusEvent) {
        self.events.push_back(event);
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Number of delivered messages that were acknowledged
    pub fn committed(&self) -> usize {
        self.committed
    }
}

impl MessageSource for MemorySource {
    async fn poll(&mut self, _timeout: Duration) -> BusEvent {
        let event = self
            .events
            .pop_front()
            .unwrap_or(BusEvent::Error(TransportError::Closed));
        if matches!(event, BusEvent::Message(_)) {
            self.delivered += 1;
        }
        event
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        if self.committed < self.delivered {
            self.committed += 1;
        }
        Ok(())
    }
}

/// Collects produced messages
#[derive(Debug, Default)]
pub struct MemorySink {
    produced: Vec<BusMessage>,
    flushes: usize,
    failure: Option<TransportError>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every produce call fails with `error`
    pub fn failing(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn produced(&self) -> &[BusMessage] {
        &self.produced
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl MessageSink for MemorySink {
    async fn produce(&mut self, message: BusMessage) -> Result<(), TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.produced.push(message);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.flushes += 1;
        Ok(())
    }
}
