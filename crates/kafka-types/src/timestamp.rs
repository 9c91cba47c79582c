//! Millisecond timestamps used as message keys.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
///
/// Serializes as a bare integer so it can sit directly in a message key.
/// [`fmt::Display`] renders the local wall-clock time instead, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTimestamp(i64);

impl EventTimestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// `YYYY-MM-DD HH:MM:SS` in local time, falling back to the raw millis
    /// when the value is out of chrono's range.
    pub fn human_readable(self) -> String {
        match DateTime::from_timestamp_millis(self.0) {
            Some(utc) => utc
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            None => self.0.to_string(),
        }
    }
}

impl fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_millis() {
        let ts = EventTimestamp::from_millis(1_700_000_000_123);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1700000000123");
    }

    #[test]
    fn test_human_readable_does_not_change_key() {
        let ts = EventTimestamp::from_millis(1_700_000_000_123);
        let rendered = ts.to_string();
        assert_eq!(rendered.len(), "2023-11-14 22:13:20".len());
        assert_eq!(ts.as_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_now_is_millisecond_resolution() {
        let before = Utc::now().timestamp_millis();
        let ts = EventTimestamp::now();
        let after = Utc::now().timestamp_millis();
        assert!(ts.as_millis() >= before && ts.as_millis() <= after);
    }
}
