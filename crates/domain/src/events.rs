//! Typed lifecycle events emitted by the generation pipeline and the
//! context reducers.
//!
//! Every event carries the envelope fields (timestamp, trace id,
//! correlation id) plus a tagged payload. The dispatcher in `ax-events`
//! fans these out to registered listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::UsageMetrics;

/// A lifecycle event with its envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub trace_id: Uuid,
    pub correlation_id: Uuid,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Wrap a payload in a fresh envelope.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            payload,
        }
    }

    /// Wrap a payload, correlating it with an existing request.
    pub fn correlated(correlation_id: Uuid, payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: Uuid::new_v4(),
            correlation_id,
            payload,
        }
    }
}

/// Phase of a fallback attempt, so downstream consumers can render
/// same-model retries and cross-model hops uniformly while keeping the
/// intent distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPhase {
    Retry,
    FallbackChain,
    SameProvider,
    CrossProvider,
}

/// Per-tool-result record emitted with `ContextEditingCompleted`. Every
/// tool response the editor considered appears here, including the ones
/// it skipped and why.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponseEvaluation {
    pub tool_name: String,
    pub tokens: usize,
    pub turn_age: u32,
    pub meets_token_threshold: bool,
    pub meets_turn_threshold: bool,
    pub was_compacted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    // ── Generation pipeline ────────────────────────────────────────
    #[serde(rename = "llm_generation_with_retry")]
    LlmGenerationWithRetry {
        turn: u32,
        model: String,
        attempt: u32,
        max_retries: u32,
    },
    #[serde(rename = "llm_generation_error")]
    LlmGenerationError {
        turn: u32,
        model: String,
        error: String,
    },
    #[serde(rename = "fallback_attempt")]
    FallbackAttempt {
        phase: FallbackPhase,
        from_model: String,
        to_model: String,
        attempt: u32,
        success: bool,
    },
    #[serde(rename = "fallback_model_used")]
    FallbackModelUsed {
        from_model: String,
        to_model: String,
        reason: String,
    },
    #[serde(rename = "model_change")]
    ModelChange {
        from_model: String,
        to_model: String,
        reason: String,
    },
    #[serde(rename = "throttling_detected")]
    ThrottlingDetected {
        model: String,
        attempt: u32,
        delay_secs: u64,
    },
    #[serde(rename = "context_cancelled")]
    ContextCancelled { turn: u32 },

    // ── Streaming ──────────────────────────────────────────────────
    #[serde(rename = "streaming_start")]
    StreamingStart { turn: u32, model: String },
    #[serde(rename = "streaming_chunk")]
    StreamingChunk { content: String, index: u32 },
    #[serde(rename = "streaming_end")]
    StreamingEnd {
        total_chunks: usize,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_tokens: Option<u32>,
    },
    #[serde(rename = "tool_call_start")]
    ToolCallStart {
        turn: u32,
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        turn: u32,
        call_id: String,
        name: String,
        result: String,
        duration_ms: u64,
    },

    // ── Context management ─────────────────────────────────────────
    #[serde(rename = "context_summarization_started")]
    ContextSummarizationStarted {
        turn: u32,
        message_count: usize,
        current_tokens: usize,
    },
    #[serde(rename = "context_summarization_completed")]
    ContextSummarizationCompleted {
        turn: u32,
        messages_before: usize,
        messages_after: usize,
        summary: String,
        usage: UsageMetrics,
    },
    #[serde(rename = "context_summarization_error")]
    ContextSummarizationError { turn: u32, error: String },
    #[serde(rename = "context_editing_completed")]
    ContextEditingCompleted {
        total_messages: usize,
        tool_responses: usize,
        compacted: usize,
        tokens_saved: usize,
        evaluations: Vec<ToolResponseEvaluation>,
    },
}

impl EventPayload {
    /// The serde tag of this payload, for listener filtering and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LlmGenerationWithRetry { .. } => "llm_generation_with_retry",
            Self::LlmGenerationError { .. } => "llm_generation_error",
            Self::FallbackAttempt { .. } => "fallback_attempt",
            Self::FallbackModelUsed { .. } => "fallback_model_used",
            Self::ModelChange { .. } => "model_change",
            Self::ThrottlingDetected { .. } => "throttling_detected",
            Self::ContextCancelled { .. } => "context_cancelled",
            Self::StreamingStart { .. } => "streaming_start",
            Self::StreamingChunk { .. } => "streaming_chunk",
            Self::StreamingEnd { .. } => "streaming_end",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallEnd { .. } => "tool_call_end",
            Self::ContextSummarizationStarted { .. } => "context_summarization_started",
            Self::ContextSummarizationCompleted { .. } => "context_summarization_completed",
            Self::ContextSummarizationError { .. } => "context_summarization_error",
            Self::ContextEditingCompleted { .. } => "context_editing_completed",
        }
    }
}
