//! Binary framing of envelope records.
//!
//! Records are CBOR maps with text keys. Two shapes exist on the wire:
//!
//! ```text
//! plain:     { encryption_public_key?, sign_with_service_key?,
//!              payload, synctime, function }
//! encrypted: { signature?, data, encrypted: true, fingerprint, synctime }
//! ```

use acquire_core::Value;

use crate::error::{EnvelopeError, Result};

/// Maximum number of encrypted layers peeled from one envelope.
pub const MAX_NESTING_DEPTH: usize = 8;

/// CBOR map key names.
pub(crate) mod keys {
    pub const PAYLOAD: &str = "payload";
    pub const FUNCTION: &str = "function";
    pub const SYNCTIME: &str = "synctime";
    pub const ENCRYPTION_PUBLIC_KEY: &str = "encryption_public_key";
    pub const SIGN_WITH_SERVICE_KEY: &str = "sign_with_service_key";
    pub const DATA: &str = "data";
    pub const ENCRYPTED: &str = "encrypted";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const SIGNATURE: &str = "signature";

    pub const STATUS: &str = "status";
    pub const RETURN: &str = "return";
    pub const RESULT: &str = "result";
    pub const EXCEPTION: &str = "exception";
    pub const ERROR: &str = "error";
    pub const CLASS: &str = "class";
    pub const MODULE: &str = "module";
    pub const TRACEBACK: &str = "traceback";
    pub const FRAMES: &str = "frames";
}

/// Encode a record to bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| EnvelopeError::Packing(e.to_string()))?;
    Ok(buf)
}

/// Decode bytes into a record's entries.
pub fn decode(bytes: &[u8]) -> Result<Vec<(Value, Value)>> {
    let value: Value = ciborium::from_reader(bytes).map_err(|e| {
        EnvelopeError::Decode(format!("cannot decode envelope of {} bytes: {e}", bytes.len()))
    })?;

    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(EnvelopeError::Decode(format!(
            "expected an envelope map, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(_, _) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_core::value::text_map;

    #[test]
    fn test_encode_decode() {
        let record = text_map([(keys::PAYLOAD, Value::from("x"))]);
        let entries = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(Value::Map(entries), record);
    }

    #[test]
    fn test_decode_rejects_non_map() {
        let bytes = encode(&Value::from(42)).unwrap();
        assert!(matches!(decode(&bytes), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(&[0xff, 0x00, 0x13]),
            Err(EnvelopeError::Decode(_))
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                match decode(&bytes) {
                    Ok(_) | Err(EnvelopeError::Decode(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }

            #[test]
            fn test_record_entries_survive(
                entries in prop::collection::vec(("[a-z_]{1,12}", any::<i64>(), ".{0,24}"), 0..8),
            ) {
                let record = Value::Map(
                    entries
                        .iter()
                        .map(|(k, n, t)| {
                            (
                                Value::Text(k.clone()),
                                Value::Array(vec![Value::from(*n), Value::Text(t.clone())]),
                            )
                        })
                        .collect(),
                );
                let decoded = decode(&encode(&record).unwrap()).unwrap();
                prop_assert_eq!(decoded.len(), entries.len());
                prop_assert_eq!(Value::Map(decoded), record);
            }
        }
    }
}
