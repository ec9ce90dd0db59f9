//! Single-attempt LLM execution.
//!
//! The executor owns the agent-level credential pool and the factory
//! registry. Per attempt it resolves effective credentials (model record
//! over pool), builds a transient provider, and performs exactly one
//! `generate` call. It never retries; retry and fallback live in the
//! coordinator.

use std::sync::Arc;

use ax_domain::{CancelToken, Error, GenerationResponse, Message, ModelRecord, Result};

use crate::registry::ProviderRegistry;
use crate::traits::{GenerateOptions, ResolvedCredentials};

/// Agent-level credential defaults, used when a model record carries none
/// of its own.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    pub api_key: Option<String>,
    pub region: Option<String>,
}

pub struct LlmExecutor {
    registry: Arc<ProviderRegistry>,
    pool: CredentialPool,
    /// Agent default sampling temperature; model records override.
    default_temperature: Option<f32>,
}

impl LlmExecutor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        pool: CredentialPool,
        default_temperature: Option<f32>,
    ) -> Self {
        Self {
            registry,
            pool,
            default_temperature,
        }
    }

    /// Merge the model record's own credentials over the agent pool.
    /// Model region overrides pool region; model temperature overrides the
    /// agent default.
    fn resolve_credentials(&self, model: &ModelRecord) -> ResolvedCredentials {
        ResolvedCredentials {
            api_key: model.api_key.clone().or_else(|| self.pool.api_key.clone()),
            region: model.region.clone().or_else(|| self.pool.region.clone()),
            temperature: model.temperature.or(self.default_temperature),
        }
    }

    /// Build a transient provider for `model` and perform one call.
    ///
    /// The caller's `opts` are cloned and appended to, never mutated.
    pub async fn execute(
        &self,
        cancel: &CancelToken,
        model: &ModelRecord,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<GenerationResponse> {
        let credentials = self.resolve_credentials(model);
        let factory = self.registry.get(&model.provider_id).ok_or_else(|| {
            Error::Config(format!(
                "no provider factory registered for '{}'",
                model.provider_id
            ))
        })?;
        let provider = factory.build(model, &credentials)?;

        let mut call_opts = opts.clone();
        if call_opts.temperature.is_none() {
            call_opts.temperature = credentials.temperature;
        }

        provider.generate(cancel, messages, &call_opts).await
    }
}
