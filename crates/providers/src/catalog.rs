//! Model metadata catalog.
//!
//! The summarizer needs the active model's context window to decide when
//! to trigger. Metadata is served through the [`ModelCatalog`] trait; the
//! in-memory [`StaticModelCatalog`] is seeded at startup and may be
//! extended at runtime. A model without an entry simply makes the
//! summarizer decline — absence is non-fatal by design.

use std::collections::HashMap;

use parking_lot::RwLock;

use ax_domain::ModelMetadata;

pub trait ModelCatalog: Send + Sync {
    fn metadata(&self, model_id: &str) -> Option<ModelMetadata>;
}

/// Map of `model_id → metadata` under a reader/writer lock.
#[derive(Default)]
pub struct StaticModelCatalog {
    entries: RwLock<HashMap<String, ModelMetadata>>,
}

impl StaticModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog pre-seeded with the context windows of commonly deployed
    /// models. Callers register anything else they serve.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        for (id, window, max_out) in [
            ("claude-sonnet-4-20250514", 200_000, Some(64_000)),
            ("claude-opus-4-6", 200_000, Some(32_000)),
            ("gpt-4o", 128_000, Some(16_384)),
            ("gpt-4o-mini", 128_000, Some(16_384)),
            ("gemini-2.5-pro", 1_048_576, Some(65_536)),
            ("gemini-2.5-flash", 1_048_576, Some(65_536)),
        ] {
            catalog.register(
                id,
                ModelMetadata {
                    context_window: window,
                    max_output_tokens: max_out,
                },
            );
        }
        catalog
    }

    pub fn register(&self, model_id: impl Into<String>, metadata: ModelMetadata) {
        self.entries.write().insert(model_id.into(), metadata);
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn metadata(&self, model_id: &str) -> Option<ModelMetadata> {
        self.entries.read().get(model_id).copied()
    }
}
