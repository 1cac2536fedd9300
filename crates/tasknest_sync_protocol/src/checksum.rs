//! Order-independent payload checksums.
//!
//! Two payloads that differ only in object key order must hash identically,
//! so the serialization is canonicalized (keys sorted recursively) before
//! hashing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hex checksum of an optional entity payload.
///
/// `None` hashes to a fixed digest distinct from any real payload, so a
/// delete record still carries a comparable checksum.
pub fn payload_checksum(data: Option<&Value>) -> String {
    let mut canonical = String::new();
    match data {
        Some(value) => write_canonical(value, &mut canonical),
        None => canonical.push_str("null"),
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Writes a canonical text form of `value` with object keys sorted.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(key);
                out.push_str("\":");
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}
