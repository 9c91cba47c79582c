use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Topic creation failed for a reason other than "already exists".
    #[error("Failed to provision topic '{topic}': {reason}")]
    Provision { topic: String, reason: String },

    /// The broker reported an error instead of a message.
    #[error("Poll error: {0}")]
    Poll(String),

    /// A message handler failed. Only ever logged by the consumer loop.
    #[error("Handler failed on {position}: {message}")]
    Handler { position: String, message: String },

    /// A record could not be enqueued for sending.
    #[error("Failed to enqueue record for topic '{topic}': {reason}")]
    Transport { topic: String, reason: String },

    #[error("{remaining} record(s) still in flight after flushing for {timeout:?}")]
    FlushTimeout { remaining: usize, timeout: Duration },

    /// The broker rejected records after they were enqueued.
    #[error("{failed} record(s) failed delivery")]
    DeliveryFailed { failed: u64 },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Types(#[from] cta_types::TypesError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
