//! Cache keys
//!
//! A key binds a stage's output to exactly the inputs that produced it:
//! the document fingerprint, the stage name, and the stage configuration.
//! Configuration is hashed in canonical form (object keys sorted at every
//! depth) so logically equal configs always map to the same key.

use redline_content::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display};

const DOMAIN: &[u8] = b"redline.transformation-cache.v1";

/// 32-byte BLAKE3 cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive key from `(fingerprint, stage, config)`
    #[must_use]
    pub fn derive(fingerprint: &Fingerprint, stage: &str, config: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(config, &mut canonical);

        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN);
        hasher.update(fingerprint.as_bytes());
        hasher.update(&(stage.len() as u64).to_le_bytes());
        hasher.update(stage.as_bytes());
        hasher.update(canonical.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Serialize `value` with object keys sorted recursively
pub(crate) fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical(value: &Value) -> String {
        let mut out = String::new();
        write_canonical(value, &mut out);
        out
    }

    #[test]
    fn canonical_sorts_nested_keys() {
        let value = json!({"b": {"y": 1, "x": [ {"d": 1, "c": 2} ]}, "a": "s"});
        assert_eq!(canonical(&value), r#"{"a":"s","b":{"x":[{"c":2,"d":1}],"y":1}}"#);
    }

    #[test]
    fn canonical_keeps_array_order() {
        assert_ne!(canonical(&json!([1, 2])), canonical(&json!([2, 1])));
    }

    #[test]
    fn key_depends_on_every_input() {
        let fp = Fingerprint::of_text("contract");
        let base = CacheKey::derive(&fp, "review", &json!({"model": "a"}));

        assert_ne!(base, CacheKey::derive(&Fingerprint::of_text("other"), "review", &json!({"model": "a"})));
        assert_ne!(base, CacheKey::derive(&fp, "rationale", &json!({"model": "a"})));
        assert_ne!(base, CacheKey::derive(&fp, "review", &json!({"model": "b"})));
        assert_eq!(base, CacheKey::derive(&fp, "review", &json!({"model": "a"})));
    }

    #[test]
    fn stage_name_is_length_prefixed() {
        let fp = Fingerprint::of_text("contract");
        assert_ne!(
            CacheKey::derive(&fp, "ab", &json!("c")),
            CacheKey::derive(&fp, "a", &json!("bc"))
        );
    }

    #[test]
    fn display_is_hex() {
        let key = CacheKey::derive(&Fingerprint::of_text("x"), "s", &Value::Null);
        assert_eq!(key.to_string().len(), 64);
    }
}
