// hasher.rs — SHA-256 and canonical JSON hashing.
//
// All hashes in Warden are SHA-256, lowercase hex. Parameter and result
// payloads are hashed over their canonical JSON form (object keys sorted,
// compact separators) so that two logically equal payloads always hash the
// same regardless of how the caller ordered the keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes to a 64-character lowercase hex SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Render a JSON value canonically: object keys sorted, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Hash a JSON value over its canonical form.
pub fn hash_json(value: &Value) -> String {
    hash_str(&canonical_json(value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
