//! Stations stream: raw station rows in, a table of stations keyed by station
//! id out.
//!
//! Each row is reduced to its id, stop name, display order and a single line
//! (red, then blue, then green). The table is held in memory and every upsert
//! is mirrored to the changelog topic `org.chicago.cta.stations.table.v1`,
//! which is also what the table is rebuilt from on startup.

pub mod aggregator;
pub mod error;
pub mod sync;
pub mod table;

pub use aggregator::{stations_table, StationAggregator};
pub use error::{Error, Result};
pub use sync::{run_stations_stream, Config};
pub use table::MaterializedTable;
