//! Logging handler for the arrivals fan-in consumer.

use cta_events_kafka::{decode_record, Codec, JsonCodec, MessageHandler, RawMessage};
use cta_types::schema::bundled;
use cta_types::{ArrivalKey, ArrivalValue, Schema};
use tracing::info;

/// Decodes arrival events and logs one line per arrival.
pub struct ArrivalLogger {
    key_schema: Schema,
    value_schema: Schema,
    codec: Box<dyn Codec>,
    seen: u64,
}

impl ArrivalLogger {
    pub fn new() -> cta_types::Result<Self> {
        Ok(Self {
            key_schema: bundled::arrival_key()?,
            value_schema: bundled::arrival_value()?,
            codec: Box::new(JsonCodec),
            seen: 0,
        })
    }

    /// Arrivals logged so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn decode(
        &self,
        message: &RawMessage,
    ) -> cta_events_kafka::Result<(ArrivalKey, ArrivalValue)> {
        let key = decode_record(
            self.codec.as_ref(),
            Some(&self.key_schema),
            message.key_bytes()?,
        )?;
        let value = decode_record(
            self.codec.as_ref(),
            Some(&self.value_schema),
            message.payload_bytes()?,
        )?;
        Ok((key, value))
    }
}

impl MessageHandler for ArrivalLogger {
    fn handle(&mut self, message: &RawMessage) -> anyhow::Result<()> {
        let (key, value) = self.decode(message)?;
        self.seen += 1;
        info!(
            "[{}] train {} ({}) arrived at station {} on the {} line, direction {}",
            key.timestamp,
            value.train_id,
            value.train_status,
            value.station_id,
            value.line,
            value.direction
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cta_events_kafka::testing::ScriptedSource;
    use cta_events_kafka::{ConsumerOptions, EventConsumer, TopicPartition};
    use cta_types::topics::ARRIVALS_PATTERN;

    fn arrival(offset: i64, payload: &str) -> RawMessage {
        RawMessage::new("org.chicago.cta.station.austin.arrivals.v1", 0, offset)
            .with_key(r#"{"timestamp":1700000000000}"#)
            .with_payload(payload)
    }

    #[tokio::test]
    async fn test_logs_valid_arrivals_and_skips_bad_ones() {
        let source = ScriptedSource::new().assign_on_subscribe(vec![TopicPartition::new(
            "org.chicago.cta.station.austin.arrivals.v1",
            0,
        )]);
        let valid = serde_json::json!({
            "station_id": 40010,
            "train_id": "GL005",
            "direction": "a",
            "line": "green",
            "train_status": "in_service",
            "prev_station_id": null,
            "prev_direction": null,
        });
        source.push_message(arrival(0, &valid.to_string()));
        source.push_message(arrival(1, r#"{"station_id":40010}"#));

        let mut consumer = EventConsumer::new(
            ARRIVALS_PATTERN,
            source,
            ArrivalLogger::new().unwrap(),
            ConsumerOptions::default(),
        )
        .unwrap();

        let summary = consumer.drain().await;
        assert_eq!(summary.handled, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(consumer.handler().seen(), 1);
    }
}
