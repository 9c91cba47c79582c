//! Per-station arrival producer.

use anyhow::{Context, Result};
use cta_events_kafka::{EventProducer, ProducerOptions, Transport};
use cta_types::schema::bundled;
use cta_types::topics::arrivals_topic;
use cta_types::{ArrivalKey, ArrivalValue, Direction, Line, TrainStatus};
use std::fmt;
use tracing::debug;

/// A train as seen by the stations it passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Train {
    pub train_id: String,
    pub status: TrainStatus,
}

impl Train {
    pub fn new(train_id: impl Into<String>, status: TrainStatus) -> Self {
        Self {
            train_id: train_id.into(),
            status,
        }
    }
}

/// Emits an arrival event every time a train reaches this station.
///
/// Each station writes to its own topic, named after the station.
pub struct StationArrivals {
    station_id: i64,
    name: String,
    line: Line,
    a_train: Option<Train>,
    b_train: Option<Train>,
    producer: EventProducer,
}

impl StationArrivals {
    pub async fn new(
        transport: &Transport,
        station_id: i64,
        name: &str,
        line: Line,
        options: &ProducerOptions,
    ) -> Result<Self> {
        let producer = EventProducer::new(
            transport,
            &arrivals_topic(name),
            bundled::arrival_key().context("Failed to load arrival key schema")?,
            Some(bundled::arrival_value().context("Failed to load arrival value schema")?),
            options,
        )
        .await;

        Ok(Self {
            station_id,
            name: name.to_string(),
            line,
            a_train: None,
            b_train: None,
            producer,
        })
    }

    pub fn station_id(&self) -> i64 {
        self.station_id
    }

    pub fn topic(&self) -> &str {
        self.producer.topic()
    }

    /// A train arrived heading in direction `a`.
    pub fn arrive_a(
        &mut self,
        train: &Train,
        prev_station_id: Option<i64>,
        prev_direction: Option<Direction>,
    ) -> Result<()> {
        self.a_train = Some(train.clone());
        self.arrive(train, Direction::A, prev_station_id, prev_direction)
    }

    /// A train arrived heading in direction `b`.
    pub fn arrive_b(
        &mut self,
        train: &Train,
        prev_station_id: Option<i64>,
        prev_direction: Option<Direction>,
    ) -> Result<()> {
        self.b_train = Some(train.clone());
        self.arrive(train, Direction::B, prev_station_id, prev_direction)
    }

    fn arrive(
        &self,
        train: &Train,
        direction: Direction,
        prev_station_id: Option<i64>,
        prev_direction: Option<Direction>,
    ) -> Result<()> {
        let key = ArrivalKey {
            timestamp: EventProducer::time_millis(),
        };
        let value = ArrivalValue {
            station_id: self.station_id,
            train_id: train.train_id.clone(),
            direction,
            line: self.line,
            train_status: train.status,
            prev_station_id,
            prev_direction,
        };

        self.producer
            .emit(&key, &value)
            .with_context(|| format!("Failed to produce arrival at {}", self.name))?;
        debug!(
            "Produced arrival at {} ({}): train {} direction {} on {} line, status {}",
            key.timestamp.human_readable(),
            self.name,
            value.train_id,
            value.direction,
            value.line,
            value.train_status
        );
        Ok(())
    }

    /// Flush outstanding arrivals.
    pub fn close(&self) -> Result<()> {
        self.producer
            .close()
            .with_context(|| format!("Failed to flush arrivals for {}", self.name))
    }
}

impl fmt::Display for StationArrivals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let train_id = |train: &Option<Train>| {
            train
                .as_ref()
                .map_or_else(|| "---".to_string(), |t| t.train_id.clone())
        };
        write!(
            f,
            "Station | {:^5} | {:<30} | Direction A: | {:^5} | Direction B: | {:^5} |",
            self.station_id,
            self.name,
            train_id(&self.a_train),
            train_id(&self.b_train)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cta_events_kafka::testing::{MemoryAdmin, MemorySink};
    use cta_events_kafka::{JsonCodec, TopicProvisioner};
    use std::sync::Arc;

    fn transport(admin: &MemoryAdmin, sink: &MemorySink) -> Transport {
        Transport::new(
            Arc::new(TopicProvisioner::new(Arc::new(admin.clone()))),
            Arc::new(sink.clone()),
            Arc::new(JsonCodec),
        )
    }

    #[tokio::test]
    async fn test_topic_is_derived_from_station_name() {
        let admin = MemoryAdmin::default();
        let sink = MemorySink::default();
        let station = StationArrivals::new(
            &transport(&admin, &sink),
            40380,
            "Clark/Lake",
            Line::Blue,
            &ProducerOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            station.topic(),
            "org.chicago.cta.station.clark_and_lake.arrivals.v1"
        );
        assert_eq!(admin.create_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_arrivals_carry_direction_and_previous_stop() {
        let admin = MemoryAdmin::default();
        let sink = MemorySink::default();
        let mut station = StationArrivals::new(
            &transport(&admin, &sink),
            40010,
            "Austin",
            Line::Green,
            &ProducerOptions::default(),
        )
        .await
        .unwrap();
        let train = Train::new("GL005", TrainStatus::InService);

        station.arrive_a(&train, None, None).unwrap();
        station
            .arrive_b(&train, Some(40020), Some(Direction::B))
            .unwrap();
        station.close().unwrap();

        let values: Vec<ArrivalValue> = sink
            .records_for(station.topic())
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].direction, Direction::A);
        assert_eq!(values[0].prev_station_id, None);
        assert_eq!(values[1].direction, Direction::B);
        assert_eq!(values[1].prev_station_id, Some(40020));
        assert_eq!(values[1].line, Line::Green);

        let rendered = station.to_string();
        assert!(rendered.contains("Austin"));
        assert!(rendered.contains("GL005"));
    }
}
