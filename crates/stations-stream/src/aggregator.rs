//! Station rows in, one transformed row per station out.

use crate::error::{Error, Result};
use crate::table::MaterializedTable;
use cta_events_kafka::{
    decode_record, Codec, ConsumerOptions, EventConsumer, MessageHandler, MessageSource,
    OffsetReset, RawMessage, TopicPartition, Transport, Watermarks,
};
use cta_types::schema::bundled;
use cta_types::topics::{table_topic, STATIONS_TOPIC};
use cta_types::{Schema, StationRecord, TransformedStation};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Name of the stations table, which is also its changelog topic.
pub fn stations_table() -> String {
    table_topic(STATIONS_TOPIC)
}

pub struct StationAggregator {
    input_schema: Schema,
    codec: Arc<dyn Codec>,
    table: MaterializedTable<i64, TransformedStation>,
}

impl StationAggregator {
    pub async fn new(transport: &Transport, replication: i32) -> Result<Self> {
        let input_schema = bundled::station_value()?;
        let table_name = stations_table();
        let table = MaterializedTable::new(
            transport,
            &table_name,
            &table_name,
            Some(bundled::transformed_station()?),
            replication,
        )
        .await;

        Ok(Self {
            input_schema,
            codec: Arc::clone(&transport.codec),
            table,
        })
    }

    pub fn table(&self) -> &MaterializedTable<i64, TransformedStation> {
        &self.table
    }

    /// Transform one station row and upsert it under its station id.
    pub fn process(&mut self, message: &RawMessage) -> Result<TransformedStation> {
        let record: StationRecord = decode_record(
            self.codec.as_ref(),
            Some(&self.input_schema),
            message.payload_bytes()?,
        )?;
        let station = TransformedStation::try_from(&record)?;

        self.table.upsert(station.station_id, station.clone())?;
        debug!(
            "Station {} '{}' on the {} line",
            station.station_id, station.station_name, station.line
        );
        Ok(station)
    }

    /// Rebuild the table by replaying its changelog from `source`.
    ///
    /// Replay ends once every assigned partition has been read up to the high
    /// watermark observed after assignment. Empty polls on the way there are
    /// waited out, up to `timeout`. Returns the number of changelog records
    /// applied.
    pub async fn recover<S: MessageSource>(
        &mut self,
        source: S,
        timeout: Duration,
    ) -> Result<usize> {
        let topic = self.table.changelog_topic().to_string();
        let deadline = Instant::now() + timeout;
        let options = ConsumerOptions {
            offset_reset: OffsetReset::Earliest,
            ..ConsumerOptions::default()
        };
        let retry_interval = options.poll_timeout;

        info!("Replaying changelog '{topic}'...");
        let replay = ChangelogReplay {
            table: &mut self.table,
            positions: HashMap::new(),
        };
        let mut consumer = EventConsumer::new(&topic, source, replay, options)?;

        let mut replayed = 0;
        let mut targets = None;
        loop {
            let summary = consumer.drain().await;
            replayed += summary.handled;

            if targets.is_none() && consumer.is_assigned() {
                match consumer.source_mut().watermarks(retry_interval).await {
                    Ok(watermarks) => {
                        debug!("Changelog '{topic}' watermarks: {watermarks:?}");
                        targets = Some(watermarks);
                    }
                    Err(e) => warn!("Could not fetch watermarks of '{topic}', retrying: {e}"),
                }
            }
            if let Some(targets) = &targets {
                if consumer.handler().caught_up(targets) {
                    break;
                }
            }

            if Instant::now() >= deadline {
                consumer.close();
                return Err(Error::RecoveryTimeout {
                    table: topic,
                    timeout,
                });
            }
            tokio::time::sleep(retry_interval).await;
        }
        consumer.close();
        drop(consumer);

        info!(
            "Replayed {replayed} changelog record(s), table '{topic}' has {} row(s)",
            self.table.len()
        );
        Ok(replayed)
    }
}

/// Applies changelog records to a table, remembering how far each partition
/// has been read.
struct ChangelogReplay<'a> {
    table: &'a mut MaterializedTable<i64, TransformedStation>,
    positions: HashMap<TopicPartition, i64>,
}

impl ChangelogReplay<'_> {
    fn caught_up(&self, targets: &[(TopicPartition, Watermarks)]) -> bool {
        targets.iter().all(|(partition, watermarks)| {
            watermarks.is_empty()
                || self
                    .positions
                    .get(partition)
                    .is_some_and(|offset| watermarks.reached_by(*offset))
        })
    }
}

impl MessageHandler for ChangelogReplay<'_> {
    fn handle(&mut self, message: &RawMessage) -> anyhow::Result<()> {
        // a record that fails to apply has still been read
        self.positions.insert(
            TopicPartition::new(&message.topic, message.partition),
            message.offset,
        );
        self.table.apply_changelog(message)?;
        Ok(())
    }
}

impl MessageHandler for StationAggregator {
    fn handle(&mut self, message: &RawMessage) -> anyhow::Result<()> {
        self.process(message)?;
        Ok(())
    }
}
