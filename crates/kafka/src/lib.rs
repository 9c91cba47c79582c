//! Kafka transport for the CTA event streams.
//!
//! Features:
//!
//! - Topic Provisioning: create each topic at most once per process, tolerating
//!   topics that already exist or are created concurrently elsewhere
//! - Producers: schema-validated, fire-and-forget sends with delivery
//!   bookkeeping and a bounded flush on close
//! - Paced Consumers: drain everything available, then sleep, with explicit
//!   acceptance of partition assignments
//! - In-memory broker fakes for testing code built on top of this crate

pub mod admin;
pub mod codec;
pub mod config;

/// Drain-then-sleep consumer loop over a [`consumer::MessageSource`]
pub mod consumer;
pub mod error;
pub mod message;

/// Per-topic producers sharing one provisioner, sink and codec
pub mod producer;
pub mod provision;
pub mod sink;
pub mod source;
pub mod testing;

// Re-export main types for easy access
pub use admin::{CreateOutcome, KafkaAdmin, TopicAdmin, TopicSpec};
pub use codec::{decode_record, encode_record, Codec, JsonCodec};
pub use config::{
    BrokerArgs, ConsumerArgs, ConsumerOptions, OffsetReset, ProducerArgs, ProducerOptions,
};
pub use consumer::{
    Assignment, DrainEnd, DrainSummary, EventConsumer, MessageHandler, MessageSource, OnAssign,
};
pub use error::{Error, Result};
pub use message::{RawMessage, TopicPartition, Watermarks};
pub use producer::{EventProducer, RecordSink, Transport};
pub use provision::{ProvisionOutcome, TopicProvisioner};
pub use sink::{DeliveryStats, KafkaSink};
pub use source::{KafkaSource, SourceConfig};
