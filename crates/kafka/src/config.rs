//! Broker, consumer and producer settings.
//!
//! Each setting exists twice: as a plain options struct with the defaults the
//! transport relies on, and as clap args that binaries flatten into their
//! subcommands.

use clap::{Args, ValueEnum};
use std::time::Duration;

/// Default broker list: the three-node local cluster.
pub const DEFAULT_BROKERS: &str =
    "PLAINTEXT://localhost:9092,PLAINTEXT://localhost:9093,PLAINTEXT://localhost:9094";

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_secs(1);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a consumer group without committed offsets starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OffsetReset {
    /// Start from the beginning of each partition
    Earliest,
    /// Only read messages produced after subscribing
    #[default]
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Options for an event consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Consumer group ID; defaults to the topic pattern
    pub group_id: Option<String>,
    pub offset_reset: OffsetReset,
    /// How long a single poll waits for a message
    pub poll_timeout: Duration,
    /// How long the loop sleeps after a drain cycle finds nothing more
    pub idle_sleep: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            group_id: None,
            offset_reset: OffsetReset::Latest,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_sleep: DEFAULT_IDLE_SLEEP,
        }
    }
}

/// Options for an event producer.
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    pub partitions: i32,
    pub replicas: i32,
    /// Upper bound on how long `close` waits for in-flight records
    pub flush_timeout: Duration,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            partitions: 1,
            replicas: 1,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

/// Broker connection arguments.
#[derive(Args, Clone, Debug)]
pub struct BrokerArgs {
    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(
        long,
        env = "KAFKA_BROKERS",
        value_delimiter = ',',
        default_value = DEFAULT_BROKERS
    )]
    pub brokers: Vec<String>,

    /// Schema registry URL. Records are validated against the schemas
    /// bundled with the binary, so the JSON codec does not contact it
    #[arg(long, env = "SCHEMA_REGISTRY_URL")]
    pub schema_registry_url: Option<String>,
}

impl BrokerArgs {
    /// Value for librdkafka's `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

/// Consumer loop arguments.
#[derive(Args, Clone, Debug)]
pub struct ConsumerArgs {
    /// Consumer group ID (defaults to the topic pattern)
    #[arg(long)]
    pub group_id: Option<String>,

    /// Where to start when the group has no committed offsets
    #[arg(long, value_enum, default_value_t = OffsetReset::Latest)]
    pub offset_reset: OffsetReset,

    /// Poll timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_timeout_ms: u64,

    /// Sleep between drain cycles in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub idle_sleep_ms: u64,
}

impl From<&ConsumerArgs> for ConsumerOptions {
    fn from(args: &ConsumerArgs) -> Self {
        Self {
            group_id: args.group_id.clone(),
            offset_reset: args.offset_reset,
            poll_timeout: Duration::from_millis(args.poll_timeout_ms),
            idle_sleep: Duration::from_millis(args.idle_sleep_ms),
        }
    }
}

/// Producer arguments.
#[derive(Args, Clone, Debug)]
pub struct ProducerArgs {
    /// Partitions for topics this process creates
    #[arg(long, default_value_t = 1)]
    pub partitions: i32,

    /// Replication factor for topics this process creates
    #[arg(long, default_value_t = 1)]
    pub replicas: i32,

    /// How long closing a producer waits for in-flight records, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub flush_timeout_ms: u64,
}

impl From<&ProducerArgs> for ProducerOptions {
    fn from(args: &ProducerArgs) -> Self {
        Self {
            partitions: args.partitions,
            replicas: args.replicas,
            flush_timeout: Duration::from_millis(args.flush_timeout_ms),
        }
    }
}
