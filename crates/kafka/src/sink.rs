//! rdkafka-backed [`RecordSink`] with delivery bookkeeping.

use crate::error::{Error, Result};
use crate::producer::RecordSink;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

/// Counters updated from the producer's delivery callback.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Records enqueued but not yet acknowledged either way.
    pub fn pending(&self) -> u64 {
        self.enqueued()
            .saturating_sub(self.delivered() + self.failed())
    }
}

/// Producer context that accounts for every delivery report.
#[derive(Default)]
pub struct DeliveryTracker {
    stats: Arc<DeliveryStats>,
}

impl ClientContext for DeliveryTracker {}

impl ProducerContext for DeliveryTracker {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        match delivery_result {
            Ok(message) => {
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                trace!(
                    "Delivered record to {}/{}@{}",
                    message.topic(),
                    message.partition(),
                    message.offset()
                );
            }
            Err((err, message)) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!("Failed to deliver record to {}: {err}", message.topic());
            }
        }
    }
}

/// Sends records through a librdkafka producer whose queue is served by a
/// background thread, so `send` never waits for the broker.
pub struct KafkaSink {
    producer: ThreadedProducer<DeliveryTracker>,
}

impl KafkaSink {
    pub fn new(bootstrap_servers: &str) -> Result<Self> {
        let producer: ThreadedProducer<DeliveryTracker> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create_with_context(DeliveryTracker::default())?;

        Ok(Self { producer })
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.producer.context().stats
    }
}

impl RecordSink for KafkaSink {
    fn send(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<()> {
        let record = BaseRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record)
            .map_err(|(err, _)| Error::Transport {
                topic: topic.to_string(),
                reason: err.to_string(),
            })?;
        self.stats().enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout)?;
        Ok(())
    }

    fn in_flight(&self) -> usize {
        usize::try_from(self.producer.in_flight_count()).unwrap_or(0)
    }

    fn failed(&self) -> u64 {
        self.stats().failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_counts_unacknowledged() {
        let stats = DeliveryStats::default();
        stats.enqueued.store(5, Ordering::SeqCst);
        stats.delivered.store(3, Ordering::SeqCst);
        stats.failed.store(1, Ordering::SeqCst);
        assert_eq!(stats.pending(), 1);
    }
}
