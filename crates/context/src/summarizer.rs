//! History summarization.
//!
//! When cumulative usage crosses the configured fraction of the active
//! model's context window, the old prefix of the conversation is rendered
//! into a transcript, summarized by the model itself (through the same
//! generation pipeline, so retries and fallbacks apply), and the history
//! is rebuilt as `[system?, summary, recent…]`.
//!
//! The split point is adjusted so a tool call and its results are never
//! separated: results kept in the tail pull their owning call into the
//! tail, and a prefix ending on an assistant-with-tool-calls absorbs the
//! results that follow it.

use std::sync::Arc;

use ax_domain::config::SummarizeConfig;
use ax_domain::events::EventPayload;
use ax_domain::message::find_tool_call_owner;
use ax_domain::{
    CancelToken, ContentPart, Message, MessageContent, Role, TokenCounter, UsageMetrics,
};
use ax_events::EventDispatcher;
use ax_providers::{GenerateOptions, GenerationCoordinator, ModelCatalog};

/// Fixed system prompt for the summarization call. Enumerates what the
/// digest must preserve so the rebuilt history stays actionable.
const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
You are a conversation summarizer for an AI agent. Produce a dense summary \
of the conversation so far that preserves, with exact wording where it \
matters:\n\
1. Decisions made and the plan currently being executed\n\
2. Every file path, URL, and identifier mentioned\n\
3. Tool calls that were made, their key arguments, and the essential part \
of their results\n\
4. Errors encountered and how they were resolved\n\
5. Open tasks and unresolved questions\n\
Write in present tense. Omit pleasantries. Never invent details.";

/// Outcome of a summarization pass.
#[derive(Debug, Clone)]
pub struct SummarizeResult {
    pub messages: Vec<Message>,
    /// Usage of the summarization call itself; recorded by the session
    /// under turn 0. `None` when the pass declined or failed.
    pub usage: Option<UsageMetrics>,
    pub summarized: bool,
}

impl SummarizeResult {
    fn unchanged(messages: &[Message]) -> Self {
        Self {
            messages: messages.to_vec(),
            usage: None,
            summarized: false,
        }
    }
}

pub struct ContextSummarizer {
    config: SummarizeConfig,
    coordinator: Arc<GenerationCoordinator>,
    catalog: Arc<dyn ModelCatalog>,
    dispatcher: Arc<EventDispatcher>,
    counter: TokenCounter,
}

impl ContextSummarizer {
    pub fn new(
        config: SummarizeConfig,
        coordinator: Arc<GenerationCoordinator>,
        catalog: Arc<dyn ModelCatalog>,
        dispatcher: Arc<EventDispatcher>,
        counter: TokenCounter,
    ) -> Self {
        Self {
            config,
            coordinator,
            catalog,
            dispatcher,
            counter,
        }
    }

    pub fn keep_last(&self) -> usize {
        self.config.keep_last
    }

    /// Token-pressure trigger. Declines when disabled, when the threshold
    /// mode is off, or when the catalog has no context window for the
    /// model (a retryable, non-fatal condition).
    pub fn should_summarize(&self, current_usage: usize, model_id: &str) -> bool {
        if !self.config.enabled || !self.config.token_threshold_mode {
            return false;
        }
        match self.catalog.metadata(model_id) {
            Some(meta) => {
                current_usage as f64 >= meta.context_window as f64 * self.config.threshold_percent
            }
            None => {
                tracing::debug!(model_id, "no catalog metadata; summarizer declines");
                false
            }
        }
    }

    /// Summarize everything before the computed split point and rebuild
    /// the history. On failure the original messages come back unchanged.
    pub async fn summarize_conversation_history(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        keep_last: usize,
        turn: u32,
    ) -> SummarizeResult {
        let total = messages.len();
        let split = compute_split(messages, keep_last);

        let (system, body_start) = match messages.first() {
            Some(m) if m.role == Role::System => (Some(m.clone()), 1),
            _ => (None, 0),
        };

        if split <= body_start {
            // Nothing old enough to fold away.
            return SummarizeResult::unchanged(messages);
        }

        let prefix = &messages[body_start..split];
        let rendered = render_history(prefix);

        self.dispatcher
            .emit(EventPayload::ContextSummarizationStarted {
                turn,
                message_count: prefix.len(),
                current_tokens: self.counter.count(&rendered),
            });

        let request = vec![
            Message::system(SUMMARIZATION_SYSTEM_PROMPT),
            Message::user(format!(
                "Summarize the following conversation:\n\n{rendered}"
            )),
        ];
        let opts = GenerateOptions {
            temperature: Some(0.0),
            ..Default::default()
        };

        // Turn 0: the summarizer's own usage is bookkept outside any user turn.
        match self.coordinator.generate(cancel, &request, &opts, 0).await {
            Ok(outcome) => {
                let summary = outcome.response.first_text();
                if summary.is_empty() {
                    self.dispatcher
                        .emit(EventPayload::ContextSummarizationError {
                            turn,
                            error: "summarization returned empty content".into(),
                        });
                    return SummarizeResult::unchanged(messages);
                }

                let banner = format!(
                    "=== CONVERSATION SUMMARY (Previous {} messages) ===\n\n{summary}\n\n=== END SUMMARY ===",
                    prefix.len()
                );

                let mut rebuilt = Vec::with_capacity(2 + total - split);
                if let Some(system) = system {
                    rebuilt.push(system);
                }
                rebuilt.push(Message::user(banner));
                rebuilt.extend_from_slice(&messages[split..]);

                self.dispatcher
                    .emit(EventPayload::ContextSummarizationCompleted {
                        turn,
                        messages_before: total,
                        messages_after: rebuilt.len(),
                        summary,
                        usage: outcome.usage,
                    });

                SummarizeResult {
                    messages: rebuilt,
                    usage: Some(outcome.usage),
                    summarized: true,
                }
            }
            Err(e) if e.is_cancellation() => {
                // The pipeline already emitted ContextCancelled; hand the
                // caller its history back untouched.
                SummarizeResult::unchanged(messages)
            }
            Err(e) => {
                self.dispatcher
                    .emit(EventPayload::ContextSummarizationError {
                        turn,
                        error: e.to_string(),
                    });
                SummarizeResult::unchanged(messages)
            }
        }
    }

    /// Trigger check plus summarization in one call, for the turn loop.
    pub async fn maybe_summarize(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        current_usage: usize,
        model_id: &str,
        turn: u32,
    ) -> SummarizeResult {
        if !self.should_summarize(current_usage, model_id) {
            return SummarizeResult::unchanged(messages);
        }
        self.summarize_conversation_history(cancel, messages, self.config.keep_last, turn)
            .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Split-point computation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Desired split is `len - keep_last`, then two adjustments in order:
///
/// 1. Backward walk: a tool result kept in the tail pulls its owning
///    assistant call into the tail.
/// 2. Forward walk: a prefix ending on an assistant-with-tool-calls
///    absorbs the tool results that immediately follow it.
fn compute_split(messages: &[Message], keep_last: usize) -> usize {
    let total = messages.len();
    let mut split = total.saturating_sub(keep_last);

    loop {
        let mut moved = false;
        for i in split..total {
            if let Some((call_id, _, _)) = messages[i].as_tool_result() {
                if let Some(owner) = find_tool_call_owner(messages, call_id, i) {
                    if owner < split {
                        split = owner;
                        moved = true;
                    }
                }
            }
        }
        if !moved {
            break;
        }
    }

    if split > 0 && split < total && messages[split - 1].has_tool_calls() {
        while split < total && messages[split].role == Role::Tool {
            split += 1;
        }
    }

    split
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render the prefix as `[Turn n] <role>: <content>` blocks with tool
/// calls and results inlined.
fn render_history(prefix: &[Message]) -> String {
    let mut out = String::new();
    let mut turn = 0usize;

    for message in prefix {
        if message.role == Role::User {
            turn += 1;
        }
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        out.push_str(&format!("[Turn {turn}] {role}: "));
        out.push_str(&render_content(&message.content));
        out.push('\n');
    }

    out
}

fn render_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.clone(),
                ContentPart::ToolCall {
                    name, arguments, ..
                } => format!("[tool_call {name} arguments={arguments}]"),
                ContentPart::ToolResult {
                    tool_name, content, ..
                } => format!("[tool_result {tool_name}: {content}]"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
