//! Provider factory registry.
//!
//! One [`ProviderFactory`] per `provider_id`. The executor looks the
//! factory up on every attempt and builds a transient provider, so a
//! model record carrying its own credentials or region gets a fresh,
//! correctly-scoped client each time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::traits::ProviderFactory;

#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider_id: impl Into<String>, factory: Arc<dyn ProviderFactory>) {
        self.factories.write().insert(provider_id.into(), factory);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.read().get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}
