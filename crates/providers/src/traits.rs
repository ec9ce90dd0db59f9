use std::sync::Arc;

use ax_domain::{
    CancelToken, ChunkSender, GenerationResponse, Message, ModelRecord, Result, ToolDefinition,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Callback invoked with every streamed content fragment.
pub type ContentCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-request generation options.
///
/// The coordinator and executor clone this per attempt and append to the
/// clone; the caller's value is never mutated.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    /// Sampling temperature. When unset, the executor fills in the merged
    /// model/agent default.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Tool definitions offered to the model.
    pub tools: Vec<ToolDefinition>,
    /// Request streamed output. Streaming is only activated on the first
    /// attempt against the primary model.
    pub stream: bool,
    /// Channel a streaming provider pushes chunks into. Injected by the
    /// coordinator; callers leave this empty.
    pub chunk_sink: Option<ChunkSender>,
    /// User callback for streamed content fragments.
    pub on_content: Option<ContentCallback>,
}

impl std::fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("tools", &self.tools.len())
            .field("stream", &self.stream)
            .field("chunk_sink", &self.chunk_sink.is_some())
            .field("on_content", &self.on_content.is_some())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Credentials resolved for one attempt: the model record's own values
/// merged over the agent-level pool.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCredentials {
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub temperature: Option<f32>,
}

/// A transient, per-attempt model client.
///
/// Concrete adapters (HTTP, SDK-backed) live outside this workspace; the
/// pipeline only relies on this contract. `generate` performs no retry —
/// it is the atomic unit the coordinator composes.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<GenerationResponse>;

    fn provider_id(&self) -> &str;

    fn model_id(&self) -> &str;
}

/// Builds a [`Provider`] instance for a model record. One factory is
/// registered per `provider_id`; the executor invokes it on every attempt
/// so credentials and region resolve fresh each time.
pub trait ProviderFactory: Send + Sync {
    fn build(
        &self,
        record: &ModelRecord,
        credentials: &ResolvedCredentials,
    ) -> Result<Arc<dyn Provider>>;
}
