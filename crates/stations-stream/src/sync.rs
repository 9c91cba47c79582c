//! Stations stream runner.
//!
//! Rebuilds the stations table from its changelog, then consumes raw station
//! rows and keeps the table up to date until interrupted.

use crate::aggregator::{stations_table, StationAggregator};
use crate::error::Error;
use anyhow::{Context, Result};
use clap::Parser;
use cta_events_kafka::{
    BrokerArgs, ConsumerOptions, EventConsumer, KafkaSource, OffsetReset, ProducerArgs,
    ProducerOptions, SourceConfig, Transport,
};
use cta_types::topics::STATIONS_TOPIC;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for the stations stream.
#[derive(Debug, Clone, Parser)]
pub struct Config {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Topic carrying raw station rows
    #[arg(long, default_value = STATIONS_TOPIC)]
    pub input_topic: String,

    /// Consumer group ID (defaults to the input topic)
    #[arg(long)]
    pub group_id: Option<String>,

    /// Where to start when the group has no committed offsets
    #[arg(long, value_enum, default_value_t = OffsetReset::Earliest)]
    pub offset_reset: OffsetReset,

    /// Poll timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_timeout_ms: u64,

    /// Sleep between drain cycles in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub idle_sleep_ms: u64,

    /// Start from an empty table instead of replaying the changelog
    #[arg(long)]
    pub skip_recovery: bool,

    /// Give up replaying the changelog after this many milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub recovery_timeout_ms: u64,

    #[command(flatten)]
    pub producer: ProducerArgs,
}

impl Config {
    fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            group_id: self.group_id.clone(),
            offset_reset: self.offset_reset,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            idle_sleep: Duration::from_millis(self.idle_sleep_ms),
        }
    }

    /// Replay reads the whole changelog every time, so it never commits.
    fn recovery_source_config(&self) -> SourceConfig {
        SourceConfig {
            brokers: self.broker.bootstrap_servers(),
            group_id: format!("{}.recovery", stations_table()),
            auto_offset_reset: OffsetReset::Earliest,
            enable_auto_commit: false,
            ..SourceConfig::default()
        }
    }
}

/// Run the stations stream until Ctrl-C.
pub async fn run_stations_stream(config: Config) -> Result<()> {
    let bootstrap_servers = config.broker.bootstrap_servers();
    let producer_options = ProducerOptions::from(&config.producer);
    info!(
        "Starting stations stream from '{}' into '{}' (brokers: {bootstrap_servers})",
        config.input_topic,
        stations_table()
    );

    let transport =
        Transport::from_args(&config.broker).context("Failed to create Kafka producer")?;
    let mut aggregator = StationAggregator::new(&transport, producer_options.replicas)
        .await
        .context("Failed to create stations table")?;

    if config.skip_recovery {
        info!("Skipping changelog recovery");
    } else {
        let source = KafkaSource::with_config(config.recovery_source_config())
            .context("Failed to create changelog consumer")?;
        let timeout = Duration::from_millis(config.recovery_timeout_ms);
        match aggregator.recover(source, timeout).await {
            Ok(replayed) => info!("Recovered stations table from {replayed} record(s)"),
            Err(e @ Error::RecoveryTimeout { .. }) => {
                warn!("{e}, continuing with {} row(s)", aggregator.table().len());
            }
            Err(e) => return Err(e).context("Failed to recover stations table"),
        }
    }

    let mut consumer = EventConsumer::kafka(
        &bootstrap_servers,
        &config.input_topic,
        aggregator,
        config.consumer_options(),
    )
    .context("Failed to create stations consumer")?;

    tokio::select! {
        _ = consumer.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down stations stream");
        }
    }

    consumer.close();
    info!(
        "Stations table holds {} row(s)",
        consumer.handler().table().len()
    );

    transport
        .flush(producer_options.flush_timeout)
        .context("Failed to flush changelog writes")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["stations-stream"]);
        assert_eq!(config.input_topic, "org.chicago.cta.stations");
        assert_eq!(config.offset_reset, OffsetReset::Earliest);
        assert!(!config.skip_recovery);

        let options = config.consumer_options();
        assert_eq!(options.poll_timeout, Duration::from_millis(100));
        assert_eq!(options.idle_sleep, Duration::from_secs(1));
        assert_eq!(options.group_id, None);
    }

    #[test]
    fn test_recovery_consumer_never_commits() {
        let config = Config::parse_from(["stations-stream", "--brokers", "kafka:9092"]);
        let source = config.recovery_source_config();
        assert_eq!(source.brokers, "kafka:9092");
        assert_eq!(source.group_id, "org.chicago.cta.stations.table.v1.recovery");
        assert_eq!(source.auto_offset_reset, OffsetReset::Earliest);
        assert!(!source.enable_auto_commit);
    }
}
