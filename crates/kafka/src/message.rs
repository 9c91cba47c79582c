use crate::error::{Error, Result};

/// A partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// Offsets bounding what a partition currently holds: `low` is the first
/// readable offset, `high` the offset the next record will get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

impl Watermarks {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    /// Whether a reader whose last message was at `offset` has read up to the
    /// high watermark.
    pub fn reached_by(&self, offset: i64) -> bool {
        offset + 1 >= self.high
    }
}

/// A message as returned by a poll, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Kafka topic
    pub topic: String,
    /// Kafka partition
    pub partition: i32,
    /// Kafka offset
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message payload (absent for tombstones)
    pub payload: Option<Vec<u8>>,
    /// Message timestamp (milliseconds since epoch)
    pub timestamp: Option<i64>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: None,
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// `topic/partition@offset`, for logs.
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }

    pub fn payload_bytes(&self) -> Result<&[u8]> {
        self.payload
            .as_deref()
            .ok_or_else(|| Error::Codec(format!("Message {} has no payload", self.position())))
    }

    pub fn key_bytes(&self) -> Result<&[u8]> {
        self.key
            .as_deref()
            .ok_or_else(|| Error::Codec(format!("Message {} has no key", self.position())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermarks_reached_at_last_offset() {
        let marks = Watermarks::new(0, 3);
        assert!(!marks.is_empty());
        assert!(!marks.reached_by(1));
        assert!(marks.reached_by(2));
    }

    #[test]
    fn test_compacted_away_partition_is_empty() {
        assert!(Watermarks::new(7, 7).is_empty());
        assert!(Watermarks::new(0, 0).is_empty());
    }
}
