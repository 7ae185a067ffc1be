//! Auxiliary transaction metadata.
//!
//! User metadata is a map of registry labels to opaque JSON payloads. The
//! payload is carried verbatim in the auxiliary data section; the body
//! commits to it through the auxiliary data hash.

use crate::cbor::Writer;
use crate::hashing::blake2b_256;
use crate::TxError;
use std::collections::BTreeMap;

/// Encode one JSON payload as a metadatum.
///
/// Integers, strings, arrays and objects map directly; floats, and
/// integers outside the i64/u64 range, are not representable on the ledger.
fn encode_datum(w: &mut Writer, value: &serde_json::Value) -> Result<(), TxError> {
    match value {
        serde_json::Value::Null => w.null(),
        serde_json::Value::Bool(b) => w.bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                w.uint(u);
            } else if let Some(i) = n.as_i64() {
                w.int(i);
            } else {
                return Err(TxError::Metadata(format!("non-integral number {n}")));
            }
        }
        serde_json::Value::String(s) => w.text(s),
        serde_json::Value::Array(items) => {
            w.array(items.len());
            for item in items {
                encode_datum(w, item)?;
            }
        }
        serde_json::Value::Object(fields) => {
            // BTreeMap for deterministic key order.
            let ordered: BTreeMap<&String, &serde_json::Value> = fields.iter().collect();
            w.map(ordered.len());
            for (key, val) in ordered {
                w.text(key);
                encode_datum(w, val)?;
            }
        }
    }
    Ok(())
}

/// Encode the full auxiliary data section: label → metadatum.
pub fn encode_metadata(
    metadata: &BTreeMap<u64, serde_json::Value>,
) -> Result<Vec<u8>, TxError> {
    let mut w = Writer::new();
    w.map(metadata.len());
    for (label, value) in metadata {
        w.uint(*label);
        encode_datum(&mut w, value)?;
    }
    Ok(w.into_bytes())
}

/// Hash committed in the transaction body.
pub fn metadata_hash(
    metadata: &BTreeMap<u64, serde_json::Value>,
) -> Result<[u8; 32], TxError> {
    Ok(blake2b_256(&encode_metadata(metadata)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(u64, serde_json::Value)]) -> BTreeMap<u64, serde_json::Value> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_empty_metadata() {
        let encoded = encode_metadata(&BTreeMap::new()).unwrap();
        assert_eq!(encoded, [0xa0]);
    }

    #[test]
    fn test_simple_label() {
        let md = labels(&[(674, json!({"msg": "hello"}))]);
        let encoded = encode_metadata(&md).unwrap();
        // map(1), uint 674 (0x19 0x02 0xa2), map(1), "msg", "hello".
        assert_eq!(encoded[0], 0xa1);
        assert_eq!(&encoded[1..4], &[0x19, 0x02, 0xa2]);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = metadata_hash(&labels(&[(674, json!("a"))])).unwrap();
        let b = metadata_hash(&labels(&[(674, json!("b"))])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_float_rejected() {
        let md = labels(&[(1, json!(1.5))]);
        assert!(matches!(encode_metadata(&md), Err(TxError::Metadata(_))));
    }

    #[test]
    fn test_nested_structures() {
        let md = labels(&[(20, json!({"list": [1, 2, {"k": null}], "flag": true}))]);
        assert!(encode_metadata(&md).is_ok());
    }

    #[test]
    fn test_deterministic_object_order() {
        // serde_json preserves insertion order; encoding must not.
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        let ea = encode_metadata(&labels(&[(1, a)])).unwrap();
        let eb = encode_metadata(&labels(&[(1, b)])).unwrap();
        assert_eq!(ea, eb);
    }
}
