/// NATS integration module
///
/// Connects to NATS and adapts subscriptions and publishing to the bus traits

pub mod client;

pub use client::{NatsClient, NatsSink, NatsSource, KEY_HEADER};
