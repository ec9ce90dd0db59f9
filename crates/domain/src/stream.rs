use serde::Serialize;

/// Chunks emitted by a provider while streaming a generation.
///
/// Providers push these into the channel injected through the request
/// options; the streaming relay in `ax-providers` multiplexes them into
/// lifecycle events and the user callback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamChunk {
    /// A text fragment. `index` is the provider's choice index, not the
    /// running content counter (the relay maintains that separately).
    #[serde(rename = "content")]
    Content { text: String, index: u32 },

    /// The model started a tool call.
    #[serde(rename = "tool_call_start")]
    ToolCallStart {
        call_id: String,
        name: String,
        arguments: String,
    },

    /// A tool call finished (providers that execute tools inline).
    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        call_id: String,
        name: String,
        result: String,
        duration_ms: u64,
    },
}

/// The sending half injected into a provider call.
/// Bounded; the relay owns the receiving half.
pub type ChunkSender = tokio::sync::mpsc::Sender<StreamChunk>;
