//! Key/value encoding.
//!
//! Producers and consumers never serialize payloads themselves; they hand a
//! JSON value and the schema it should satisfy to a [`Codec`].

use crate::error::{Error, Result};
use cta_types::Schema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encode/decode capability keyed by a schema.
///
/// `schema` is `None` for payloads that have no registered schema; the codec
/// then encodes without validation.
pub trait Codec: Send + Sync {
    fn encode(&self, schema: Option<&Schema>, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, schema: Option<&Schema>, bytes: &[u8]) -> Result<Value>;
}

/// Plain JSON payloads, validated against the schema on both sides.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, schema: Option<&Schema>, value: &Value) -> Result<Vec<u8>> {
        if let Some(schema) = schema {
            schema.validate(value)?;
        }
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, schema: Option<&Schema>, bytes: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::Codec(format!("Payload is not valid JSON: {e}")))?;
        if let Some(schema) = schema {
            schema.validate(&value)?;
        }
        Ok(value)
    }
}

/// Encode a typed record through `codec`.
pub fn encode_record<T: Serialize + ?Sized>(
    codec: &dyn Codec,
    schema: Option<&Schema>,
    record: &T,
) -> Result<Vec<u8>> {
    codec.encode(schema, &serde_json::to_value(record)?)
}

/// Decode a typed record through `codec`.
pub fn decode_record<T: DeserializeOwned>(
    codec: &dyn Codec,
    schema: Option<&Schema>,
    bytes: &[u8],
) -> Result<T> {
    let value = codec.decode(schema, bytes)?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cta_types::schema::bundled;
    use cta_types::{ArrivalKey, EventTimestamp};
    use serde_json::json;

    #[test]
    fn test_encode_validates_against_schema() {
        let schema = bundled::arrival_key().unwrap();
        let err = JsonCodec
            .encode(Some(&schema), &json!({ "ts": 1 }))
            .unwrap_err();
        assert!(matches!(err, Error::Types(_)));
    }

    #[test]
    fn test_encode_without_schema() {
        let bytes = JsonCodec.encode(None, &json!([1, 2, 3])).unwrap();
        assert_eq!(bytes, b"[1,2,3]");
    }

    #[test]
    fn test_typed_record() {
        let schema = bundled::arrival_key().unwrap();
        let key = ArrivalKey {
            timestamp: EventTimestamp::from_millis(1_700_000_000_000),
        };

        let bytes = encode_record(&JsonCodec, Some(&schema), &key).unwrap();
        assert_eq!(bytes, br#"{"timestamp":1700000000000}"#);

        let decoded: ArrivalKey = decode_record(&JsonCodec, Some(&schema), &bytes).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = JsonCodec.decode(None, b"\x00\x01").unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
