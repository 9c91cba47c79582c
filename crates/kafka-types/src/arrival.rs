//! Train arrival events emitted by station producers.

use crate::error::{Result, TypesError};
use crate::station::Line;
use crate::timestamp::EventTimestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Track direction at a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    A,
    B,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::A => "a",
            Direction::B => "b",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a" => Ok(Direction::A),
            "b" => Ok(Direction::B),
            other => Err(TypesError::InvalidValue {
                kind: "direction",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    OutOfService,
    InService,
    BrokenDown,
}

impl TrainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainStatus::OutOfService => "out_of_service",
            TrainStatus::InService => "in_service",
            TrainStatus::BrokenDown => "broken_down",
        }
    }
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "out_of_service" => Ok(TrainStatus::OutOfService),
            "in_service" => Ok(TrainStatus::InService),
            "broken_down" => Ok(TrainStatus::BrokenDown),
            other => Err(TypesError::InvalidValue {
                kind: "train status",
                value: other.to_string(),
            }),
        }
    }
}

/// Key of an arrival message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalKey {
    pub timestamp: EventTimestamp,
}

impl ArrivalKey {
    pub fn now() -> Self {
        Self {
            timestamp: EventTimestamp::now(),
        }
    }
}

/// Value of an arrival message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalValue {
    pub station_id: i64,
    pub train_id: String,
    pub direction: Direction,
    pub line: Line,
    pub train_status: TrainStatus,
    /// `None` when the train starts its run at this station.
    pub prev_station_id: Option<i64>,
    pub prev_direction: Option<Direction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_value_json_shape() {
        let value = ArrivalValue {
            station_id: 40010,
            train_id: "RL001".to_string(),
            direction: Direction::A,
            line: Line::Red,
            train_status: TrainStatus::InService,
            prev_station_id: None,
            prev_direction: None,
        };

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["direction"], "a");
        assert_eq!(json["train_status"], "in_service");
        assert!(json["prev_station_id"].is_null());
    }

    #[test]
    fn test_parse_direction_and_status() {
        assert_eq!("B".parse::<Direction>().unwrap(), Direction::B);
        assert_eq!(
            "broken-down".parse::<TrainStatus>().unwrap(),
            TrainStatus::BrokenDown
        );
        assert_eq!(TrainStatus::OutOfService.to_string(), "out_of_service");
        assert!(matches!(
            "c".parse::<Direction>(),
            Err(TypesError::InvalidValue { kind: "direction", .. })
        ));
    }

    #[test]
    fn test_arrival_key_is_flat_timestamp() {
        let key = ArrivalKey {
            timestamp: EventTimestamp::from_millis(42),
        };
        assert_eq!(
            serde_json::to_value(key).unwrap(),
            serde_json::json!({ "timestamp": 42 })
        );
    }
}
