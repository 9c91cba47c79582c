//! Record types shared by the CTA station event streams.
//!
//! This crate defines everything that crosses a topic boundary:
//!
//! - [`station`] - station records read by the stations stream and the
//!   transformed rows written to its table
//! - [`arrival`] - arrival events emitted by station producers
//! - [`schema`] - record schemas used by the codec to validate payloads
//! - [`timestamp`] - millisecond event timestamps used as message keys
//! - [`topics`] - deterministic topic naming
//!
//! # Dependency Direction
//!
//! The transport crate (`cta-events-kafka`) and the stream crates depend on
//! this crate, never the other way around. Nothing here talks to a broker.

pub mod arrival;
pub mod error;
pub mod schema;
pub mod station;
pub mod timestamp;
pub mod topics;

pub use arrival::{ArrivalKey, ArrivalValue, Direction, TrainStatus};
pub use error::{Result, TypesError};
pub use schema::{Field, FieldType, Primitive, Schema};
pub use station::{Line, StationRecord, TransformedStation};
pub use timestamp::EventTimestamp;
