//! Topic naming.
//!
//! All names are deterministic so that producers, consumers and the
//! streaming-SQL program agree without coordination.

/// Station rows exported from the stations database.
pub const STATIONS_TOPIC: &str = "org.chicago.cta.stations";

/// Turnstile entries, summarised by the streaming-SQL program.
pub const TURNSTILE_TOPIC: &str = "org.chicago.cta.turnstile.v1";

/// Subscription pattern matching every station's arrivals topic.
pub const ARRIVALS_PATTERN: &str = r"^org\.chicago\.cta\.station\..*\.arrivals\.v1$";

/// Suffix appended to a table's logical name to form its changelog topic.
pub const TABLE_TOPIC_SUFFIX: &str = ".table.v1";

/// Normalise a station name for use inside a topic name.
///
/// Lower-cases, replaces `/` with `_and_`, spaces and `-` with `_`, and drops
/// apostrophes: `"Harlem/Lake"` becomes `"harlem_and_lake"`.
pub fn normalize_station_name(name: &str) -> String {
    name.to_lowercase()
        .replace('/', "_and_")
        .replace([' ', '-'], "_")
        .replace('\'', "")
}

/// Arrivals topic for a station, e.g. `org.chicago.cta.station.austin.arrivals.v1`.
pub fn arrivals_topic(station_name: &str) -> String {
    format!(
        "org.chicago.cta.station.{}.arrivals.v1",
        normalize_station_name(station_name)
    )
}

/// Changelog topic backing the table with the given logical name.
pub fn table_topic(logical_name: &str) -> String {
    format!("{logical_name}{TABLE_TOPIC_SUFFIX}")
}
