//! Canonical signatures for arbitrary JSON payloads.
//!
//! Pattern counting keys on a stable, hashable representation of an
//! observation. The canonical form serializes scalars with serde_json,
//! keeps arrays in order, and recursively sorts object keys, so two payloads
//! that differ only in map insertion order produce the same signature.

use serde_json::Value;

/// Compute the canonical signature of a JSON payload.
///
/// Deterministic and independent of object key order at every nesting level.
pub fn canonical_signature(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json escaping keeps strings unambiguous against delimiters
            out.push_str(&serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s)));
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
                out.push_str(&serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key)));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(canonical_signature(&json!(null)), "null");
        assert_eq!(canonical_signature(&json!(true)), "true");
        assert_eq!(canonical_signature(&json!(42)), "42");
        assert_eq!(canonical_signature(&json!(1.5)), "1.5");
        assert_eq!(canonical_signature(&json!("hi")), "\"hi\"");
    }

    #[test]
    fn test_object_key_order_independent() {
        let mut a = serde_json::Map::new();
        a.insert("b".to_string(), json!(2));
        a.insert("a".to_string(), json!(1));

        let mut b = serde_json::Map::new();
        b.insert("a".to_string(), json!(1));
        b.insert("b".to_string(), json!(2));

        assert_eq!(
            canonical_signature(&Value::Object(a)),
            canonical_signature(&Value::Object(b))
        );
    }

    #[test]
    fn test_nested_determinism() {
        let left = json!({"outer": {"z": [1, 2], "a": "x"}, "flag": true});
        let right = json!({"flag": true, "outer": {"a": "x", "z": [1, 2]}});
        assert_eq!(canonical_signature(&left), canonical_signature(&right));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            canonical_signature(&json!([1, 2])),
            canonical_signature(&json!([2, 1]))
        );
    }

    #[test]
    fn test_string_escaping_disambiguates() {
        // A string containing delimiters must not collide with structure
        assert_ne!(
            canonical_signature(&json!("[1,2]")),
            canonical_signature(&json!([1, 2]))
        );
    }
}
