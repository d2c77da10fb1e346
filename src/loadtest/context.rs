//! Accumulated workflow state shared between sequence steps.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::loadtest::path::{self, PathError, PathExpr, PathOptions, Resolved, ValueMapping};

/// Mutable key/value store threaded through a sequence execution.
///
/// Keys are caller-chosen strings, values are arbitrary JSON. Later writes
/// silently overwrite earlier ones. The store is plain data: whoever runs a
/// sequence owns it and passes it in explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextStore {
    values: Map<String, Value>,
}

impl ContextStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Stores a value under a top-level key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Point-writes a value at a dotted/bracketed key path.
    pub fn write(&mut self, key_path: &str, value: Value) -> Result<(), PathError> {
        path::write(&mut self.values, key_path, value)
    }

    /// Evaluates a path query against the whole store.
    pub fn resolve(&self, path: &PathExpr) -> Result<Resolved, PathError> {
        path.resolve_in(&self.values)
    }

    /// Applies a mapping that reads from and writes into this store.
    ///
    /// Every entry is resolved against the store as it was before the call,
    /// then all results are written, so entries never observe each other.
    pub fn transform(&mut self, mapping: &ValueMapping, options: PathOptions) -> Result<(), PathError> {
        for (key, value) in mapping.resolve(&self.values, options)? {
            self.write(&key, value)?;
        }
        Ok(())
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops all stored values.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Consumes the store, returning it as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<Map<String, Value>> for ContextStore {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> ContextStore {
        match value {
            Value::Object(map) => ContextStore::from(map),
            other => panic!("expected object, got {other}"),
        }
    }

    fn mapping(value: Value) -> ValueMapping {
        match value {
            Value::Object(map) => ValueMapping::from_map(&map).unwrap(),
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_transform_adds_mapped_key() {
        let mut ctx = store(json!({"a": 5}));
        ctx.transform(&mapping(json!({"x": "$.a"})), PathOptions::default())
            .unwrap();
        assert_eq!(ctx.get("x"), Some(&json!(5)));
        assert_eq!(ctx.get("a"), Some(&json!(5)));
    }

    #[test]
    fn test_transform_is_idempotent() {
        let mut ctx = store(json!({"a": 5}));
        let m = mapping(json!({"x": "$.a"}));
        ctx.transform(&m, PathOptions::default()).unwrap();
        let once = ctx.clone();
        ctx.transform(&m, PathOptions::default()).unwrap();
        assert_eq!(ctx, once);
    }

    #[test]
    fn test_transform_unwraps_single_match() {
        let mut ctx = store(json!({"users": [{"id": 9}]}));
        ctx.transform(
            &mapping(json!({"user": "$.users[*]"})),
            PathOptions { wrap: Some(false) },
        )
        .unwrap();
        assert_eq!(ctx.get("user"), Some(&json!({"id": 9})));
    }

    #[test]
    fn test_transform_entries_read_original_state() {
        let mut ctx = store(json!({"a": 1, "b": 2}));
        ctx.transform(
            &mapping(json!({"a": "$.b", "b": "$.a"})),
            PathOptions::default(),
        )
        .unwrap();
        assert_eq!(ctx.into_value(), json!({"a": 2, "b": 1}));
    }

    #[test]
    fn test_transform_missing_path_fails_without_writing() {
        let mut ctx = store(json!({"a": 1}));
        let err = ctx
            .transform(
                &mapping(json!({"x": "$.a", "y": "$.missing"})),
                PathOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PathError::NotFound { .. }));
        assert!(ctx.get("x").is_none());
    }

    #[test]
    fn test_clear_empties_store() {
        let mut ctx = ContextStore::new();
        ctx.insert("k", json!(true));
        ctx.write("nested.k", json!(1)).unwrap();
        assert_eq!(ctx.len(), 2);
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
