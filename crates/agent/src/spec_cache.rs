//! Cache of generated OpenAPI specs for tool catalogs.
//!
//! Spec generation is expensive and the result is stable per catalog, so
//! generated documents are cached under a reader/writer lock shared by
//! all requests. Writes are rare (first generation, explicit
//! invalidation); reads are the hot path. The configured API base URL
//! override is applied to every document on insertion.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

pub struct SpecCache {
    /// Base URL substituted into each spec's `servers` entry.
    api_base: Option<String>,
    specs: RwLock<HashMap<String, Value>>,
}

impl SpecCache {
    pub fn new(api_base: Option<String>) -> Self {
        Self {
            api_base,
            specs: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, catalog: &str) -> Option<Value> {
        self.specs.read().get(catalog).cloned()
    }

    /// Fetch the cached spec, generating it with `generate` on a miss.
    /// Single-writer: the write lock is only taken when the fast read
    /// misses, and a racing generation keeps the first inserted value.
    pub fn get_or_insert_with<F>(&self, catalog: &str, generate: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(spec) = self.get(catalog) {
            return spec;
        }
        let mut specs = self.specs.write();
        specs
            .entry(catalog.to_owned())
            .or_insert_with(|| self.apply_api_base(generate()))
            .clone()
    }

    pub fn insert(&self, catalog: impl Into<String>, spec: Value) {
        let spec = self.apply_api_base(spec);
        self.specs.write().insert(catalog.into(), spec);
    }

    pub fn invalidate(&self, catalog: &str) -> bool {
        self.specs.write().remove(catalog).is_some()
    }

    pub fn len(&self) -> usize {
        self.specs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.read().is_empty()
    }

    fn apply_api_base(&self, mut spec: Value) -> Value {
        if let Some(base) = &self.api_base {
            if spec.is_object() {
                spec["servers"] = serde_json::json!([{ "url": base }]);
            }
        }
        spec
    }
}
