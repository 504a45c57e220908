//! # obds-cleanup: oBDS record cleanup pipeline step
//!
//! Consumes report records from one or more bus topics, applies feature-gated
//! cleanups to the embedded XML payload and republishes every record to an
//! output topic.
//!
//! ## Features
//!
//! - **Record codec**: decode the JSON envelope and re-encode it as compact JSON
//!   with literal markup characters and a trailing newline
//! - **Payload transformations**: strip leading zeros from `Patient_ID`
//!   attributes, recognise oBDS 2.x documents
//! - **Feature policy**: toggles deciding which transformations run and which
//!   records are dropped
//! - **Pipeline driver**: single-consumer loop that never stalls on bad data
//!
//! ## Example
//!
//! ```
//! use obds_cleanup::{BusMessage, Disposition, FeatureFlags, FeaturePolicy, Pipeline};
//!
//! let pipeline = Pipeline::new(FeaturePolicy::new(FeatureFlags::default()), "obds.clean");
//! let value = concat!(
//!     r#"{"schema":{"type":"struct","fields":[],"optional":false},"#,
//!     r#""payload":{"YEAR":2024,"VERSIONSNUMMER":1,"ID":1,"#,
//!     r#""XML_DATEN":"<Patient Patient_ID=\"0042\"/>"}}"#,
//! );
//!
//! let message = BusMessage::new("obds.raw", None, value);
//! let Disposition::Transformed(out) = pipeline.process(message) else { unreachable!() };
//!
//! assert_eq!(out.topic, "obds.clean");
//! assert!(String::from_utf8(out.value).unwrap().contains(r#"Patient_ID=\"42\""#));
//! ```

// Core modules
pub mod record;
pub mod transform;
pub mod policy;
pub mod pipeline;

// Bus boundary and the NATS client
pub mod bus;
pub mod nats;

pub mod config;
pub mod error;
pub mod health;

// Re-export key types
pub use record::{Field, Payload, Record, Schema};
pub use transform::{PatternTransformer, PayloadTransformer};
pub use policy::{FeatureFlags, FeaturePolicy, Verdict};
pub use pipeline::{run, Disposition, Pipeline, PipelineStats, StatsSnapshot};
pub use bus::{BusEvent, BusMessage, MessageSink, MessageSource};
pub use nats::{NatsClient, NatsSink, NatsSource};
pub use config::Config;
pub use error::{CleanupError, CodecError, ConfigError, TransportError};
