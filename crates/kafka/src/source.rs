//! rdkafka-backed [`MessageSource`].

use crate::config::{ConsumerOptions, OffsetReset};
use crate::consumer::{Assignment, MessageSource, OnAssign};
use crate::error::{Error, Result};
use crate::message::{RawMessage, TopicPartition, Watermarks};
use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, Consumer as RdkafkaConsumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Configuration for a Kafka message source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    ///
    /// Defaults to the subscribed topic pattern, so every consumer of the same
    /// pattern shares offsets.
    pub group_id: String,
    /// Auto offset reset strategy ("earliest" or "latest")
    pub auto_offset_reset: OffsetReset,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Offsets are committed in the background as messages are handed out
    pub enable_auto_commit: bool,
}

impl SourceConfig {
    pub fn new(brokers: &str, pattern: &str, options: &ConsumerOptions) -> Self {
        Self {
            brokers: brokers.to_string(),
            group_id: options
                .group_id
                .clone()
                .unwrap_or_else(|| pattern.to_string()),
            auto_offset_reset: options.offset_reset,
            ..Self::default()
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "cta-events".to_string(),
            auto_offset_reset: OffsetReset::Latest,
            session_timeout_ms: "6000".to_string(),
            enable_auto_commit: true,
        }
    }
}

/// Consumer context that routes rebalances through the on-assign callback.
#[derive(Default)]
pub struct AssignmentContext {
    on_assign: OnceLock<OnAssign>,
}

impl ClientContext for AssignmentContext {}

impl ConsumerContext for AssignmentContext {
    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                let partitions = tpl
                    .elements()
                    .iter()
                    .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
                    .collect();
                let mut assignment = Assignment::new(partitions);
                if let Some(on_assign) = self.on_assign.get() {
                    on_assign(&mut assignment);
                }

                let result = if assignment.is_accepted() {
                    base_consumer.assign(tpl)
                } else {
                    warn!(
                        "Assignment of {} partition(s) was not accepted, unassigning",
                        assignment.partitions().len()
                    );
                    base_consumer.unassign()
                };
                if let Err(e) = result {
                    error!("Failed to apply partition assignment: {e}");
                }
            }
            Rebalance::Revoke(tpl) => {
                info!("Partitions revoked: {}", tpl.count());
            }
            Rebalance::Error(e) => {
                error!("Rebalance error: {e}");
            }
        }
    }
}

pub struct KafkaSource {
    consumer: Option<StreamConsumer<AssignmentContext>>,
}

impl KafkaSource {
    pub fn new(brokers: &str, pattern: &str, options: &ConsumerOptions) -> Result<Self> {
        Self::with_config(SourceConfig::new(brokers, pattern, options))
    }

    pub fn with_config(config: SourceConfig) -> Result<Self> {
        let consumer: StreamConsumer<AssignmentContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", config.enable_auto_commit.to_string())
            .set("auto.offset.reset", config.auto_offset_reset.as_str())
            .set("session.timeout.ms", &config.session_timeout_ms)
            .set("enable.partition.eof", "false")
            .create_with_context(AssignmentContext::default())
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        Ok(Self {
            consumer: Some(consumer),
        })
    }

    fn consumer(&self) -> Result<&StreamConsumer<AssignmentContext>> {
        self.consumer
            .as_ref()
            .ok_or_else(|| Error::Consumer("Consumer is closed".to_string()))
    }
}

fn to_raw(message: &BorrowedMessage<'_>) -> RawMessage {
    RawMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|k| k.to_vec()),
        payload: message.payload().map(|p| p.to_vec()),
        timestamp: message.timestamp().to_millis(),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    fn subscribe(&mut self, pattern: &str, on_assign: OnAssign) -> Result<()> {
        let consumer = self.consumer()?;
        consumer
            .context()
            .on_assign
            .set(on_assign)
            .map_err(|_| Error::Consumer("Consumer is already subscribed".to_string()))?;

        consumer
            .subscribe(&[pattern])
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to {pattern}: {e}")))
    }

    async fn poll(&mut self, timeout: Duration) -> Option<Result<RawMessage>> {
        let consumer = match self.consumer() {
            Ok(consumer) => consumer,
            Err(e) => return Some(Err(e)),
        };

        match tokio::time::timeout(timeout, consumer.recv()).await {
            Ok(Ok(message)) => Some(Ok(to_raw(&message))),
            Ok(Err(e)) => Some(Err(Error::Poll(e.to_string()))),
            Err(_) => None,
        }
    }

    async fn watermarks(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<(TopicPartition, Watermarks)>> {
        let consumer = self.consumer()?;
        let assignment = consumer.assignment()?;

        assignment
            .elements()
            .iter()
            .map(|elem| {
                let (low, high) =
                    consumer.fetch_watermarks(elem.topic(), elem.partition(), timeout)?;
                Ok((
                    TopicPartition::new(elem.topic(), elem.partition()),
                    Watermarks::new(low, high),
                ))
            })
            .collect()
    }

    fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
        }
    }
}
