//! Record schemas.
//!
//! Schemas use the Avro record notation (`type`, `name`, `namespace`,
//! `fields`) so they can be shared with a schema registry, but only the
//! subset needed to validate JSON payloads is interpreted here: primitive
//! field types and unions of primitives.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Primitive field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl Primitive {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Primitive::Null => value.is_null(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::Int => value
                .as_i64()
                .is_some_and(|v| i32::try_from(v).is_ok()),
            Primitive::Long => value.is_i64(),
            Primitive::Float | Primitive::Double => value.is_number(),
            Primitive::String => value.is_string(),
        }
    }
}

/// A field type: either a single primitive or a union such as `["null", "int"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Primitive(Primitive),
    Union(Vec<Primitive>),
}

impl FieldType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Primitive(p) => p.accepts(value),
            FieldType::Union(members) => members.iter().any(|p| p.accepts(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// A record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub fields: Vec<Field>,
}

impl Schema {
    /// Parse a schema from its JSON text.
    pub fn from_json_str(name: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| TypesError::SchemaParse {
            name: name.to_string(),
            source,
        })
    }

    /// Load a schema from a `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&path.display().to_string(), &json)
    }

    /// Fully-qualified name, used as the schema identifier.
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Check that `value` is an object whose fields match this schema.
    ///
    /// A missing field is treated as `null`, so it only passes when the
    /// field type admits null. Extra fields are ignored.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let object = value.as_object().ok_or_else(|| TypesError::SchemaMismatch {
            schema: self.full_name(),
            message: format!("expected an object, got {value}"),
        })?;

        for field in &self.fields {
            let field_value = object.get(&field.name).unwrap_or(&Value::Null);
            if !field.field_type.accepts(field_value) {
                return Err(TypesError::SchemaMismatch {
                    schema: self.full_name(),
                    message: format!(
                        "field '{}' has value {field_value} which is not {:?}",
                        field.name, field.field_type
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Schemas bundled with this crate.
pub mod bundled {
    use super::Schema;
    use crate::error::Result;

    pub fn arrival_key() -> Result<Schema> {
        Schema::from_json_str("arrival_key", include_str!("../schemas/arrival_key.json"))
    }

    pub fn arrival_value() -> Result<Schema> {
        Schema::from_json_str(
            "arrival_value",
            include_str!("../schemas/arrival_value.json"),
        )
    }

    pub fn station_value() -> Result<Schema> {
        Schema::from_json_str(
            "station_value",
            include_str!("../schemas/station_value.json"),
        )
    }

    pub fn transformed_station() -> Result<Schema> {
        Schema::from_json_str(
            "transformed_station",
            include_str!("../schemas/transformed_station.json"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_bundled_schemas_parse() {
        let key = bundled::arrival_key().unwrap();
        assert_eq!(key.full_name(), "com.cta.events.arrival.key");
        assert_eq!(bundled::arrival_value().unwrap().fields.len(), 7);
        assert_eq!(bundled::station_value().unwrap().fields.len(), 10);
        assert_eq!(bundled::transformed_station().unwrap().fields.len(), 4);
    }

    #[test]
    fn test_validate_accepts_nullable_union() {
        let schema = bundled::arrival_value().unwrap();
        let value = json!({
            "station_id": 40010,
            "train_id": "RL001",
            "direction": "a",
            "line": "red",
            "train_status": "in_service",
            "prev_station_id": null,
        });
        schema.validate(&value).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let schema = bundled::arrival_key().unwrap();
        let err = schema.validate(&json!({ "timestamp": "now" })).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_validate_rejects_missing_required_field() {
        let schema = bundled::transformed_station().unwrap();
        let err = schema
            .validate(&json!({ "station_id": 1, "station_name": "x", "order": 1 }))
            .unwrap_err();
        assert!(matches!(err, TypesError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_int_range_is_checked() {
        let schema = bundled::transformed_station().unwrap();
        let value = json!({
            "station_id": 1_i64 << 40,
            "station_name": "x",
            "order": 1,
            "line": "red",
        });
        assert!(schema.validate(&value).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type": "record", "name": "k", "fields": [{{"name": "id", "type": "long"}}]}}"#
        )
        .unwrap();

        let schema = Schema::from_file(file.path()).unwrap();
        assert_eq!(schema.full_name(), "k");
        assert_eq!(
            schema.fields[0].field_type,
            FieldType::Primitive(Primitive::Long)
        );
    }

    #[test]
    fn test_from_file_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Schema::from_file(file.path()),
            Err(TypesError::SchemaParse { .. })
        ));
    }
}
