//! CTA station event streams.
//!
//! The `cta-events` binary wires the workspace crates into four commands:
//!
//! - `arrivals` - emit simulated train arrivals for one station
//! - `consume` - log every station's arrivals
//! - `stations-stream` - maintain the stations table (see `cta_stations_stream`)
//! - `ksql` - register the turnstile summary with the streaming-SQL server
//!
//! # CLI Usage
//!
//! ```bash
//! # Three arrivals at Austin, one per second
//! cta-events arrivals --station-id 40010 --name Austin --line green --count 3
//!
//! # Log arrivals for every station from the start of each topic
//! cta-events consume --offset-reset earliest
//!
//! # Keep the stations table up to date
//! cta-events stations-stream --brokers localhost:9092
//!
//! # Create TURNSTILE and TURNSTILE_SUMMARY unless they exist
//! KSQL_URL=http://localhost:8088 cta-events ksql
//! ```

pub mod arrivals;
pub mod consume;

pub use arrivals::{StationArrivals, Train};
pub use consume::ArrivalLogger;
