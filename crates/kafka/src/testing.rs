//! In-memory stand-ins for the broker.
//!
//! Each fake is a cheap handle over shared state: clone it, give one clone to
//! the code under test and keep the other to script behaviour and inspect
//! what happened.

use crate::admin::{CreateOutcome, TopicAdmin, TopicSpec};
use crate::consumer::{Assignment, MessageSource, OnAssign};
use crate::error::{Error, Result};
use crate::message::{RawMessage, TopicPartition, Watermarks};
use crate::producer::RecordSink;
use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct AdminState {
    topics: HashSet<String>,
    hidden: HashSet<String>,
    create_failures: HashMap<String, String>,
    create_holds: HashMap<String, Arc<Notify>>,
    create_requests: Vec<TopicSpec>,
    metadata_requests: usize,
    fail_metadata: bool,
}

/// [`TopicAdmin`] over an in-memory topic set.
#[derive(Clone, Default)]
pub struct MemoryAdmin {
    state: Arc<Mutex<AdminState>>,
}

impl MemoryAdmin {
    pub fn with_topics<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let admin = Self::default();
        lock(&admin.state)
            .topics
            .extend(topics.into_iter().map(Into::into));
        admin
    }

    /// Make `topic` exist without showing up in metadata, as if another
    /// process created it after our metadata check.
    pub fn hide_from_metadata(&self, topic: &str) {
        let mut state = lock(&self.state);
        state.topics.insert(topic.to_string());
        state.hidden.insert(topic.to_string());
    }

    /// Reject create requests for `topic` with `reason`.
    pub fn fail_creates_for(&self, topic: &str, reason: &str) {
        lock(&self.state)
            .create_failures
            .insert(topic.to_string(), reason.to_string());
    }

    /// Keep create requests for `topic` pending until the returned handle is
    /// notified.
    pub fn hold_creates_for(&self, topic: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        lock(&self.state)
            .create_holds
            .insert(topic.to_string(), Arc::clone(&release));
        release
    }

    pub fn fail_metadata(&self, fail: bool) {
        lock(&self.state).fail_metadata = fail;
    }

    pub fn create_requests(&self) -> Vec<TopicSpec> {
        lock(&self.state).create_requests.clone()
    }

    pub fn metadata_requests(&self) -> usize {
        lock(&self.state).metadata_requests
    }

    pub fn topics(&self) -> HashSet<String> {
        lock(&self.state).topics.clone()
    }
}

#[async_trait]
impl TopicAdmin for MemoryAdmin {
    async fn topic_names(&self) -> Result<HashSet<String>> {
        let mut state = lock(&self.state);
        state.metadata_requests += 1;
        if state.fail_metadata {
            return Err(Error::Kafka(KafkaError::MetadataFetch(
                RDKafkaErrorCode::BrokerTransportFailure,
            )));
        }
        Ok(state.topics.difference(&state.hidden).cloned().collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateOutcome> {
        let hold = {
            let mut state = lock(&self.state);
            state.create_requests.push(spec.clone());
            state.create_holds.get(&spec.name).cloned()
        };
        if let Some(release) = hold {
            release.notified().await;
        }

        let mut state = lock(&self.state);

        if let Some(reason) = state.create_failures.get(&spec.name) {
            return Err(Error::Provision {
                topic: spec.name.clone(),
                reason: reason.clone(),
            });
        }
        if state.topics.insert(spec.name.clone()) {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }
}

/// A record accepted by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct SinkState {
    sent: Vec<SentRecord>,
    fail_sends: bool,
    stall_deliveries: bool,
    reject_deliveries: bool,
    in_flight: usize,
    failed: u64,
    flushes: Vec<Duration>,
}

/// [`RecordSink`] that keeps every record it is sent.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    /// Refuse to enqueue anything, as a full or closed producer queue would.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Keep every sent record in flight, so flushing never completes.
    pub fn stall_deliveries(&self, stall: bool) {
        lock(&self.state).stall_deliveries = stall;
    }

    /// Accept records into the queue but report each one as undeliverable.
    pub fn reject_deliveries(&self, reject: bool) {
        lock(&self.state).reject_deliveries = reject;
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        lock(&self.state).sent.clone()
    }

    /// `(key, payload)` pairs sent to `topic`, in send order.
    pub fn records_for(&self, topic: &str) -> Vec<(Vec<u8>, Vec<u8>)> {
        lock(&self.state)
            .sent
            .iter()
            .filter(|record| record.topic == topic)
            .map(|record| (record.key.clone(), record.payload.clone()))
            .collect()
    }

    /// Records sent to `topic` as they would be read back from partition 0.
    pub fn messages_for(&self, topic: &str) -> Vec<RawMessage> {
        self.records_for(topic)
            .into_iter()
            .enumerate()
            .map(|(offset, (key, payload))| {
                RawMessage::new(topic, 0, offset as i64)
                    .with_key(key)
                    .with_payload(payload)
            })
            .collect()
    }

    pub fn flushes(&self) -> Vec<Duration> {
        lock(&self.state).flushes.clone()
    }
}

impl RecordSink for MemorySink {
    fn send(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(Error::Transport {
                topic: topic.to_string(),
                reason: "Local: Queue full".to_string(),
            });
        }

        state.sent.push(SentRecord {
            topic: topic.to_string(),
            key: key.to_vec(),
            payload: payload.to_vec(),
        });
        if state.reject_deliveries {
            state.failed += 1;
        } else if state.stall_deliveries {
            state.in_flight += 1;
        }
        Ok(())
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        let mut state = lock(&self.state);
        state.flushes.push(timeout);
        if !state.stall_deliveries {
            state.in_flight = 0;
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        lock(&self.state).in_flight
    }

    fn failed(&self) -> u64 {
        lock(&self.state).failed
    }
}

enum Step {
    Message(RawMessage),
    Error(String),
    Empty,
}

struct SourceState {
    steps: VecDeque<Step>,
    pattern: Option<String>,
    on_assign: Option<OnAssign>,
    accepted: bool,
    assigned: Vec<TopicPartition>,
    // highest scripted offset + 1 per partition, unless overridden
    high_offsets: HashMap<TopicPartition, i64>,
    watermarks: HashMap<TopicPartition, Watermarks>,
    gated: bool,
    assign_on_subscribe: Option<Vec<TopicPartition>>,
    polls: Vec<Instant>,
    closed: bool,
}

/// [`MessageSource`] that replays a script of messages, errors and empty polls.
///
/// Like a real broker it delivers nothing until an assignment has been
/// accepted, unless built with [`ScriptedSource::deliver_before_assignment`].
/// Polls never wait: an empty script answers immediately. Watermarks follow
/// the scripted messages unless set with [`ScriptedSource::set_watermarks`].
#[derive(Clone)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState {
                steps: VecDeque::new(),
                pattern: None,
                on_assign: None,
                accepted: false,
                assigned: Vec::new(),
                high_offsets: HashMap::new(),
                watermarks: HashMap::new(),
                gated: true,
                assign_on_subscribe: None,
                polls: Vec::new(),
                closed: false,
            })),
        }
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose script is `messages`.
    pub fn from_messages(messages: impl IntoIterator<Item = RawMessage>) -> Self {
        let source = Self::new();
        for message in messages {
            source.push_message(message);
        }
        source
    }

    /// Hand out messages whether or not an assignment was accepted.
    pub fn deliver_before_assignment(self) -> Self {
        lock(&self.state).gated = false;
        self
    }

    /// Offer `partitions` as soon as someone subscribes, as a broker would
    /// after the group join completes.
    pub fn assign_on_subscribe(self, partitions: Vec<TopicPartition>) -> Self {
        lock(&self.state).assign_on_subscribe = Some(partitions);
        self
    }

    pub fn push_message(&self, message: RawMessage) {
        let mut state = lock(&self.state);
        let high = state
            .high_offsets
            .entry(TopicPartition::new(&message.topic, message.partition))
            .or_insert(0);
        *high = (*high).max(message.offset + 1);
        state.steps.push_back(Step::Message(message));
    }

    /// Report `watermarks` for `partition` regardless of the script, as if
    /// the broker held records this source will not deliver.
    pub fn set_watermarks(&self, partition: TopicPartition, watermarks: Watermarks) {
        lock(&self.state).watermarks.insert(partition, watermarks);
    }

    pub fn push_error(&self, reason: &str) {
        lock(&self.state)
            .steps
            .push_back(Step::Error(reason.to_string()));
    }

    /// Make one poll come back empty even though more steps follow.
    pub fn push_empty(&self) {
        lock(&self.state).steps.push_back(Step::Empty);
    }

    /// Offer `partitions` to the subscriber. Returns whether it accepted them.
    pub fn assign(&self, partitions: Vec<TopicPartition>) -> bool {
        let Some(on_assign) = lock(&self.state).on_assign.clone() else {
            return false;
        };

        let mut assignment = Assignment::new(partitions);
        on_assign(&mut assignment);

        let accepted = assignment.is_accepted();
        if accepted {
            let mut state = lock(&self.state);
            state.accepted = true;
            state.assigned = assignment.partitions().to_vec();
        }
        accepted
    }

    pub fn subscribed_pattern(&self) -> Option<String> {
        lock(&self.state).pattern.clone()
    }

    /// When each poll happened.
    pub fn polls(&self) -> Vec<Instant> {
        lock(&self.state).polls.clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.state).steps.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    fn subscribe(&mut self, pattern: &str, on_assign: OnAssign) -> Result<()> {
        let partitions = {
            let mut state = lock(&self.state);
            if state.on_assign.is_some() {
                return Err(Error::Consumer("Consumer is already subscribed".to_string()));
            }
            state.pattern = Some(pattern.to_string());
            state.on_assign = Some(on_assign);
            state.assign_on_subscribe.take()
        };

        if let Some(partitions) = partitions {
            self.assign(partitions);
        }
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> Option<Result<RawMessage>> {
        let mut state = lock(&self.state);
        state.polls.push(Instant::now());

        if state.closed || (state.gated && !state.accepted) {
            return None;
        }
        match state.steps.pop_front()? {
            Step::Message(message) => Some(Ok(message)),
            Step::Error(reason) => Some(Err(Error::Poll(reason))),
            Step::Empty => None,
        }
    }

    async fn watermarks(
        &mut self,
        _timeout: Duration,
    ) -> Result<Vec<(TopicPartition, Watermarks)>> {
        let state = lock(&self.state);
        if state.closed {
            return Err(Error::Consumer("Consumer is closed".to_string()));
        }
        if !state.accepted {
            return Ok(Vec::new());
        }

        Ok(state
            .assigned
            .iter()
            .map(|partition| {
                let watermarks = state.watermarks.get(partition).copied().unwrap_or_else(|| {
                    Watermarks::new(0, state.high_offsets.get(partition).copied().unwrap_or(0))
                });
                (partition.clone(), watermarks)
            })
            .collect())
    }

    fn close(&mut self) {
        lock(&self.state).closed = true;
    }
}
