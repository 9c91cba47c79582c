//! Keyed in-memory table backed by a changelog topic.

use crate::error::Result;
use cta_events_kafka::{
    decode_record, encode_record, Codec, RawMessage, RecordSink, TopicSpec, Transport,
};
use cta_types::Schema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::{HashMap, Iter};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

/// A table whose every upsert is also written to its changelog topic, so the
/// table can be rebuilt by replaying that topic.
///
/// There is a single writer; the last upsert for a key wins.
pub struct MaterializedTable<K, V> {
    name: String,
    changelog_topic: String,
    value_schema: Option<Schema>,
    rows: HashMap<K, V>,
    sink: Arc<dyn RecordSink>,
    codec: Arc<dyn Codec>,
}

impl<K, V> MaterializedTable<K, V>
where
    K: Eq + Hash + Debug + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Create an empty table, provisioning its changelog topic.
    ///
    /// The changelog always has a single partition so replay order is write
    /// order.
    pub async fn new(
        transport: &Transport,
        name: &str,
        changelog_topic: &str,
        value_schema: Option<Schema>,
        replication: i32,
    ) -> Self {
        let outcome = transport
            .provisioner
            .ensure(&TopicSpec::new(changelog_topic, 1, replication))
            .await;
        debug!("Changelog '{changelog_topic}' for table '{name}': {outcome:?}");

        Self {
            name: name.to_string(),
            changelog_topic: changelog_topic.to_string(),
            value_schema,
            rows: HashMap::new(),
            sink: Arc::clone(&transport.sink),
            codec: Arc::clone(&transport.codec),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn changelog_topic(&self) -> &str {
        &self.changelog_topic
    }

    /// Insert or replace the row for `key`.
    ///
    /// The changelog record is enqueued first; if that fails the table is left
    /// unchanged.
    pub fn upsert(&mut self, key: K, value: V) -> Result<()> {
        let key_bytes = encode_record(self.codec.as_ref(), None, &key)?;
        let value_bytes = encode_record(self.codec.as_ref(), self.value_schema.as_ref(), &value)?;
        self.sink
            .send(&self.changelog_topic, &key_bytes, &value_bytes)?;

        trace!("Upserted {key:?} into '{}'", self.name);
        self.rows.insert(key, value);
        Ok(())
    }

    /// Apply one changelog record without writing it back.
    ///
    /// A record without a payload deletes the key.
    pub fn apply_changelog(&mut self, message: &RawMessage) -> Result<()> {
        let key: K = decode_record(self.codec.as_ref(), None, message.key_bytes()?)?;

        match message.payload.as_deref() {
            Some(bytes) => {
                let value: V =
                    decode_record(self.codec.as_ref(), self.value_schema.as_ref(), bytes)?;
                self.rows.insert(key, value);
            }
            None => {
                self.rows.remove(&key);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        self.rows.iter()
    }
}
