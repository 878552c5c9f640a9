//! Durable cart mirror.
//!
//! The mirror is the server-side analog of browser local storage: a small
//! key-value store holding a JSON document of cart lines under one fixed key
//! and the remote cart id under another. It restores the cart view across
//! page loads and is never authoritative - hydration validates every entry
//! and silently drops anything malformed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::state::CartLine;

/// Fixed key for the serialized cart line array.
pub const LINES_KEY: &str = "stonemill:cart:lines";

/// Fixed key for the remote cart id string.
pub const CART_ID_KEY: &str = "stonemill:cart:id";

/// Durable key-value mirror for one cart session.
///
/// Write and remove failures are swallowed by implementations (logged, not
/// surfaced): losing the mirror only costs the shopper a restored cart view.
pub trait CartMirror: Send + Sync {
    /// Read the raw value stored under `key`.
    fn read(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn write(&self, key: &str, value: &str);

    /// Remove `key`.
    fn remove(&self, key: &str);
}

// =============================================================================
// Encoding / hydration
// =============================================================================

/// Serialize the full line list for the mirror.
#[must_use]
pub fn encode_lines(lines: &[CartLine]) -> String {
    serde_json::to_string(lines).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a persisted line document, keeping only well-formed entries.
///
/// Every field of every entry is type-checked by the serde decoder; entries
/// that fail (wrong type, missing field, non-positive quantity) are dropped
/// without error, and a duplicated variant keeps only its first entry (the
/// cart holds at most one line per variant). A document that is not a JSON
/// array yields an empty cart.
#[must_use]
pub fn decode_lines(raw: &str) -> Vec<CartLine> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        tracing::debug!("cart mirror is not valid JSON, starting empty");
        return Vec::new();
    };

    let Some(entries) = value.as_array() else {
        tracing::debug!("cart mirror is not an array, starting empty");
        return Vec::new();
    };

    let mut lines: Vec<CartLine> = Vec::new();
    for entry in entries {
        match serde_json::from_value::<CartLine>(entry.clone()) {
            Ok(line) if line.quantity >= 1 => {
                if lines.iter().any(|l| l.variant_id == line.variant_id) {
                    tracing::debug!("dropping duplicate persisted cart line");
                } else {
                    lines.push(line);
                }
            }
            Ok(_) => {
                tracing::debug!("dropping persisted cart line with zero quantity");
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed persisted cart line");
            }
        }
    }
    lines
}

// =============================================================================
// Implementations
// =============================================================================

impl<M: CartMirror + ?Sized> CartMirror for std::sync::Arc<M> {
    fn read(&self, key: &str) -> Option<String> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) {
        (**self).write(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

/// In-memory mirror, used in tests and as a fallback.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartMirror for MemoryMirror {
    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.entries.lock() {
            map.remove(key);
        }
    }
}

/// File-backed mirror: one file per (session scope, key) under a data dir.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
    scope: String,
}

impl FileMirror {
    /// Create a mirror scoped to one cart session.
    #[must_use]
    pub fn new(dir: PathBuf, scope: impl Into<String>) -> Self {
        Self {
            dir,
            scope: scope.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        let file: String = format!("{}.{}", self.scope, key)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl CartMirror for FileMirror {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path(key)).ok()
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(error = %e, "failed to create cart mirror directory");
            return;
        }
        if let Err(e) = std::fs::write(self.path(key), value) {
            tracing::warn!(error = %e, key, "failed to write cart mirror");
        }
    }

    fn remove(&self, key: &str) {
        let path = self.path(key);
        if path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            tracing::warn!(error = %e, key, "failed to remove cart mirror entry");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use stonemill_core::{CurrencyCode, Money, ProductId, RemoteLineId, VariantId};

    fn line(variant: &str) -> CartLine {
        CartLine {
            product_id: ProductId::new("gid://shopify/Product/p1"),
            remote_line_id: Some(RemoteLineId::new("l1")),
            variant_id: VariantId::new(variant),
            title: "Hand-blown Glass Whisk Bowl".to_string(),
            unit_price: Money::new(Decimal::new(6400, 2), CurrencyCode::NZD),
            image_url: Some("https://cdn.example/bowl.jpg".to_string()),
            quantity: 2,
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let lines = vec![line("v1"), line("v2")];
        let decoded = decode_lines(&encode_lines(&lines));
        assert_eq!(decoded, lines);
    }

    #[test]
    fn malformed_entries_are_dropped_silently() {
        // One well-formed entry, one with quantity as a string.
        let good = serde_json::to_value(line("v1")).unwrap();
        let mut bad = serde_json::to_value(line("v2")).unwrap();
        bad["quantity"] = serde_json::Value::String("2".to_string());

        let raw = serde_json::to_string(&vec![good, bad]).unwrap();
        let decoded = decode_lines(&raw);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.first().unwrap().variant_id, VariantId::new("v1"));
    }

    #[test]
    fn duplicate_variants_keep_only_the_first_entry() {
        let mut second = line("v1");
        second.quantity = 9;
        let raw = encode_lines(&[line("v1"), second]);

        let decoded = decode_lines(&raw);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.first().unwrap().quantity, 2);
    }

    #[test]
    fn zero_quantity_entries_are_dropped() {
        let mut entry = serde_json::to_value(line("v1")).unwrap();
        entry["quantity"] = serde_json::Value::from(0u32);
        let raw = serde_json::to_string(&vec![entry]).unwrap();
        assert!(decode_lines(&raw).is_empty());
    }

    #[test]
    fn non_array_documents_yield_empty_carts() {
        assert!(decode_lines("not json at all").is_empty());
        assert!(decode_lines(r#"{"lines": []}"#).is_empty());
        assert!(decode_lines("42").is_empty());
    }

    #[test]
    fn memory_mirror_stores_and_removes() {
        let mirror = MemoryMirror::new();
        assert!(mirror.read(LINES_KEY).is_none());

        mirror.write(LINES_KEY, "[]");
        mirror.write(CART_ID_KEY, "gid://shopify/Cart/c1");
        assert_eq!(mirror.read(LINES_KEY).as_deref(), Some("[]"));
        assert_eq!(
            mirror.read(CART_ID_KEY).as_deref(),
            Some("gid://shopify/Cart/c1")
        );

        mirror.remove(CART_ID_KEY);
        assert!(mirror.read(CART_ID_KEY).is_none());
    }

    #[test]
    fn file_mirror_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("stonemill-mirror-{}", std::process::id()));
        let mirror = FileMirror::new(dir.clone(), "session-a");

        mirror.write(LINES_KEY, &encode_lines(&[line("v1")]));
        let raw = mirror.read(LINES_KEY).unwrap();
        assert_eq!(decode_lines(&raw), vec![line("v1")]);

        // A different scope does not see the entry.
        let other = FileMirror::new(dir.clone(), "session-b");
        assert!(other.read(LINES_KEY).is_none());

        mirror.remove(LINES_KEY);
        assert!(mirror.read(LINES_KEY).is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}
