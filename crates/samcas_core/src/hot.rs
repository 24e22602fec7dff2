//! Hot store
//!
//! The only mutable application state of a model. Writes are compared
//! against the previous content; only real changes land in the hit set that
//! drives incremental view refreshes.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

/// Reserved key holding the textual form of the model's current state
pub const STATE_KEY: &str = "$state";

/// Tracked key/value table owned by a single model
#[derive(Debug, Clone, Default)]
pub struct HotStore {
    values: FxHashMap<String, Value>,
    hits: FxHashSet<String>,
}

impl HotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Untracked read. Tracked reads go through [`Watch`](crate::Watch).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store a value, returning whether the content changed
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.values.get(&key) == Some(&value) {
            return false;
        }
        self.hits.insert(key.clone());
        self.values.insert(key, value);
        true
    }

    /// Keys changed since the last render
    pub fn hits(&self) -> &FxHashSet<String> {
        &self.hits
    }

    pub fn is_hit(&self, key: &str) -> bool {
        self.hits.contains(key)
    }

    pub(crate) fn clear_hits(&mut self) {
        self.hits.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let mut hot = HotStore::new();
        assert!(!hot.has("x"));
        assert_eq!(hot.get("x"), None);

        assert!(hot.set("x", json!(3)));
        assert!(hot.has("x"));
        assert_eq!(hot.get("x"), Some(&json!(3)));
        assert_eq!(hot.len(), 1);
    }

    #[test]
    fn test_unchanged_write_is_not_a_hit() {
        let mut hot = HotStore::new();
        hot.set("name", json!("ada"));
        hot.clear_hits();

        assert!(!hot.set("name", json!("ada")));
        assert!(!hot.is_hit("name"));

        assert!(hot.set("name", json!("grace")));
        assert!(hot.is_hit("name"));
        assert_eq!(hot.hits().len(), 1);
    }

    #[test]
    fn test_structural_equality() {
        let mut hot = HotStore::new();
        hot.set("list", json!([1, 2, {"a": true}]));
        hot.clear_hits();

        assert!(!hot.set("list", json!([1, 2, {"a": true}])));
        assert!(hot.hits().is_empty());
    }
}
