//! Station records and the line resolution used by the stations stream.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// "L" line a station belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Line {
    Red,
    Blue,
    Green,
}

impl Line {
    /// Resolve a single line from the three membership flags.
    ///
    /// Priority is red, then blue, then green: the first flag that is set
    /// wins. Returns `None` when no flag is set.
    pub fn resolve(red: bool, blue: bool, green: bool) -> Option<Line> {
        match (red, blue, green) {
            (true, _, _) => Some(Line::Red),
            (false, true, _) => Some(Line::Blue),
            (false, false, true) => Some(Line::Green),
            (false, false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Line::Red => "red",
            Line::Blue => "blue",
            Line::Green => "green",
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Line {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(Line::Red),
            "blue" => Ok(Line::Blue),
            "green" => Ok(Line::Green),
            other => Err(TypesError::UnknownLine(other.to_string())),
        }
    }
}

/// A row of the stations topic, as exported from the stations database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub stop_id: i64,
    pub direction_id: String,
    pub stop_name: String,
    pub station_name: String,
    pub station_descriptive_name: String,
    pub station_id: i64,
    pub order: i32,
    pub red: bool,
    pub blue: bool,
    pub green: bool,
}

impl StationRecord {
    /// The line this station is reported under.
    pub fn line(&self) -> Result<Line> {
        Line::resolve(self.red, self.blue, self.green).ok_or(TypesError::NoLineFlag {
            station_id: self.station_id,
        })
    }
}

/// Value stored in the stations table, keyed by `station_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedStation {
    pub station_id: i64,
    pub station_name: String,
    pub order: i32,
    pub line: Line,
}

impl TryFrom<&StationRecord> for TransformedStation {
    type Error = TypesError;

    /// The stop name becomes the station name of the transformed row.
    fn try_from(record: &StationRecord) -> Result<Self> {
        Ok(Self {
            station_id: record.station_id,
            station_name: record.stop_name.clone(),
            order: record.order,
            line: record.line()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn austin() -> StationRecord {
        StationRecord {
            stop_id: 30001,
            direction_id: "E".to_string(),
            stop_name: "Austin".to_string(),
            station_name: "Austin".to_string(),
            station_descriptive_name: "Austin (Green Line)".to_string(),
            station_id: 40010,
            order: 1,
            red: true,
            blue: false,
            green: false,
        }
    }

    #[test]
    fn test_line_priority_all_combinations() {
        let cases = [
            ((false, false, false), None),
            ((false, false, true), Some(Line::Green)),
            ((false, true, false), Some(Line::Blue)),
            ((false, true, true), Some(Line::Blue)),
            ((true, false, false), Some(Line::Red)),
            ((true, false, true), Some(Line::Red)),
            ((true, true, false), Some(Line::Red)),
            ((true, true, true), Some(Line::Red)),
        ];

        for ((red, blue, green), expected) in cases {
            assert_eq!(
                Line::resolve(red, blue, green),
                expected,
                "flags red={red} blue={blue} green={green}"
            );
        }
    }

    #[test]
    fn test_transform_uses_stop_name() {
        let mut record = austin();
        record.station_name = "Austin-Forest Park".to_string();

        let transformed = TransformedStation::try_from(&record).unwrap();
        assert_eq!(
            transformed,
            TransformedStation {
                station_id: 40010,
                station_name: "Austin".to_string(),
                order: 1,
                line: Line::Red,
            }
        );
    }

    #[test]
    fn test_transform_without_line_fails() {
        let mut record = austin();
        record.red = false;

        let err = TransformedStation::try_from(&record).unwrap_err();
        assert!(matches!(err, TypesError::NoLineFlag { station_id: 40010 }));
    }

    #[test]
    fn test_line_serializes_lowercase() {
        let transformed = TransformedStation::try_from(&austin()).unwrap();
        let json = serde_json::to_value(&transformed).unwrap();
        assert_eq!(json["line"], "red");
        assert_eq!("Blue".parse::<Line>().unwrap(), Line::Blue);
        assert!("purple".parse::<Line>().is_err());
    }
}
