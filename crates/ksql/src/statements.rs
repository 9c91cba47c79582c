//! Built-in streaming-SQL programs.

use cta_types::topics::TURNSTILE_TOPIC;

/// Table of raw turnstile entries, read from the turnstile topic.
pub const TURNSTILE_TABLE: &str = "TURNSTILE";

/// Per-station entry counts derived from [`TURNSTILE_TABLE`].
pub const TURNSTILE_SUMMARY_TABLE: &str = "TURNSTILE_SUMMARY";

/// Statement creating [`TURNSTILE_TABLE`] and [`TURNSTILE_SUMMARY_TABLE`].
pub fn turnstile_summary() -> String {
    format!(
        "CREATE TABLE {TURNSTILE_TABLE} (
    station_id INT,
    station_name VARCHAR,
    line VARCHAR
) WITH (
    kafka_topic = '{TURNSTILE_TOPIC}',
    value_format = 'avro',
    key = 'station_id'
);

CREATE TABLE {TURNSTILE_SUMMARY_TABLE}
WITH (value_format = 'json') AS
SELECT station_id, COUNT(station_id) AS count
FROM {TURNSTILE_TABLE}
GROUP BY station_id;
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turnstile_summary_reads_turnstile_topic() {
        let statement = turnstile_summary();
        assert!(statement.contains("kafka_topic = 'org.chicago.cta.turnstile.v1'"));
        assert!(statement.starts_with("CREATE TABLE TURNSTILE ("));
        assert!(statement.contains("CREATE TABLE TURNSTILE_SUMMARY\nWITH (value_format = 'json')"));
        assert_eq!(statement.matches(';').count(), 2);
    }
}
