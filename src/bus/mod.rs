/// Message bus boundary
///
/// The pipeline drives a `MessageSource` and a `MessageSink`. The NATS client
/// implements both for production; the in-memory bus backs tests and local runs.

pub mod memory;
pub mod message;

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

pub use memory::{MemorySink, MemorySource};
pub use message::{BusEvent, BusMessage};

/// Inbound side of the bus
pub trait MessageSource {
    /// Wait at most `timeout` for the next event
    fn poll(&mut self, timeout: Duration) -> impl Future<Output = BusEvent>;

    /// Acknowledge the message last returned by `poll`.
    ///
    /// Called once the message has been forwarded or dropped. Unacknowledged
    /// messages are redelivered after a restart.
    fn commit(&mut self) -> impl Future<Output = Result<(), TransportError>>;
}

/// Outbound side of the bus
pub trait MessageSink {
    /// Hand a message to the client's outbound buffer.
    ///
    /// Does not wait for a broker acknowledgement.
    fn produce(&mut self, message: BusMessage) -> impl Future<Output = Result<(), TransportError>>;

    /// Wait until everything produced so far has been written out
    fn flush(&mut self) -> impl Future<Output = Result<(), TransportError>>;
}
