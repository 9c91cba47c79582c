//! Event producer.
//!
//! An [`EventProducer`] is bound to one topic. Constructing it provisions the
//! topic through the shared [`TopicProvisioner`]; `emit` enqueues one record
//! without waiting for the broker, and `close` flushes whatever is still in
//! flight within a bounded time.

use crate::admin::{KafkaAdmin, TopicSpec};
use crate::codec::{encode_record, Codec, JsonCodec};
use crate::config::{BrokerArgs, ProducerOptions};
use crate::error::{Error, Result};
use crate::provision::TopicProvisioner;
use crate::sink::KafkaSink;
use cta_types::{EventTimestamp, Schema};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where encoded records go.
///
/// `send` only enqueues; delivery is confirmed asynchronously and reflected
/// in `in_flight`.
pub trait RecordSink: Send + Sync {
    fn send(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for in-flight records to be acknowledged.
    fn flush(&self, timeout: Duration) -> Result<()>;

    /// Records enqueued but not yet acknowledged by the broker.
    fn in_flight(&self) -> usize;

    /// Records the broker has rejected since the sink was created.
    fn failed(&self) -> u64;
}

/// The shared pieces every producer in a process is built from.
#[derive(Clone)]
pub struct Transport {
    pub provisioner: Arc<TopicProvisioner>,
    pub sink: Arc<dyn RecordSink>,
    pub codec: Arc<dyn Codec>,
}

impl Transport {
    pub fn new(
        provisioner: Arc<TopicProvisioner>,
        sink: Arc<dyn RecordSink>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            provisioner,
            sink,
            codec,
        }
    }

    /// Kafka admin client, threaded producer and JSON codec for `bootstrap_servers`.
    pub fn kafka(bootstrap_servers: &str) -> Result<Self> {
        let admin = KafkaAdmin::new(bootstrap_servers)?;
        let sink = KafkaSink::new(bootstrap_servers)?;
        Ok(Self::new(
            Arc::new(TopicProvisioner::new(Arc::new(admin))),
            Arc::new(sink),
            Arc::new(JsonCodec),
        ))
    }

    /// Kafka transport for the cluster named by `args`.
    pub fn from_args(args: &BrokerArgs) -> Result<Self> {
        if let Some(url) = &args.schema_registry_url {
            warn!("Ignoring schema registry {url}: records are checked against bundled schemas");
        }
        Self::kafka(&args.bootstrap_servers())
    }

    /// Wait up to `timeout` for every record sent through this transport.
    ///
    /// Fails with [`Error::FlushTimeout`] if records are still in flight
    /// afterwards, and with [`Error::DeliveryFailed`] if the broker rejected
    /// any record sent so far.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        let flushed = self.sink.flush(timeout);

        let remaining = self.sink.in_flight();
        if remaining > 0 {
            return Err(Error::FlushTimeout { remaining, timeout });
        }
        let failed = self.sink.failed();
        if failed > 0 {
            return Err(Error::DeliveryFailed { failed });
        }

        flushed
    }
}

pub struct EventProducer {
    topic: TopicSpec,
    key_schema: Schema,
    value_schema: Option<Schema>,
    transport: Transport,
    flush_timeout: Duration,
}

impl EventProducer {
    /// Create a producer for `topic`, provisioning the topic if this process
    /// has not done so yet.
    ///
    /// Provisioning failures are logged and do not prevent construction.
    pub async fn new(
        transport: &Transport,
        topic: &str,
        key_schema: Schema,
        value_schema: Option<Schema>,
        options: &ProducerOptions,
    ) -> Self {
        let spec = TopicSpec::new(topic, options.partitions, options.replicas);
        let outcome = transport.provisioner.ensure(&spec).await;
        debug!("Provisioning '{topic}': {outcome:?}");

        Self {
            topic: spec,
            key_schema,
            value_schema,
            transport: transport.clone(),
            flush_timeout: options.flush_timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic.name
    }

    /// Current time as a millisecond key component.
    pub fn time_millis() -> EventTimestamp {
        EventTimestamp::now()
    }

    /// Encode and enqueue one record.
    ///
    /// Returns once the record is queued; a [`Error::Transport`] means it
    /// could not be queued at all.
    pub fn emit<K, V>(&self, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let codec = self.transport.codec.as_ref();
        let key = encode_record(codec, Some(&self.key_schema), key)?;
        let payload = encode_record(codec, self.value_schema.as_ref(), value)?;
        self.transport.sink.send(&self.topic.name, &key, &payload)
    }

    /// Flush in-flight records within the flush timeout; see
    /// [`Transport::flush`].
    ///
    /// Every producer built from one [`Transport`] shares its sink, so this
    /// also flushes records other producers sent, and the counts carried by
    /// [`Error::FlushTimeout`] and [`Error::DeliveryFailed`] cover them too.
    pub fn close(&self) -> Result<()> {
        info!("Flushing producer for topic '{}'...", self.topic.name);
        self.transport.flush(self.flush_timeout)
    }
}
