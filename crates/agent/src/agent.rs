//! The agent turn loop.
//!
//! One turn: reduce context (editor, then summarizer), generate through
//! the coordinator, execute any tool calls through the registry, offload
//! oversized results, and loop until the model answers in plain text or
//! the round budget runs out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use ax_context::{ContextEditor, ContextSummarizer};
use ax_domain::config::AgentConfig;
use ax_domain::events::EventPayload;
use ax_domain::{
    CancelToken, ContentPart, Error, GenerationResponse, LlmConfig, Message, MessageContent,
    ModelRecord, Result, Role, TokenCounter, ToolCall, ToolDefinition, ToolRegistry,
};
use ax_events::EventDispatcher;
use ax_offload::{tools, OffloadHandler, OffloadTool, PreviewStyle};
use ax_providers::{
    CredentialPool, GenerationCoordinator, LlmExecutor, ModelCatalog, ModelSelection,
    ProviderRegistry,
};
use ax_providers::traits::{ContentCallback, GenerateOptions};

use crate::session::Session;
use crate::spec_cache::SpecCache;

/// Maximum characters of a tool result copied into `ToolCallEnd` events.
const EVENT_RESULT_PREVIEW: usize = 200;

/// External collaborators the agent is wired to at construction.
pub struct AgentRuntime {
    pub providers: Arc<ProviderRegistry>,
    pub credentials: CredentialPool,
    pub catalog: Arc<dyn ModelCatalog>,
    pub tools: Arc<dyn ToolRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    /// Workspace directory the spill folder lives under.
    pub workspace_root: PathBuf,
    pub counter: TokenCounter,
}

pub struct Agent {
    config: AgentConfig,
    session: Session,
    selection: Arc<ModelSelection>,
    coordinator: Arc<GenerationCoordinator>,
    editor: ContextEditor,
    summarizer: ContextSummarizer,
    offload: Arc<OffloadHandler>,
    offload_tool: OffloadTool,
    tools: Arc<dyn ToolRegistry>,
    dispatcher: Arc<EventDispatcher>,
    spec_cache: SpecCache,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        session_id: &str,
        llm: LlmConfig,
        runtime: AgentRuntime,
    ) -> Self {
        let spill_root = runtime.workspace_root.join(&config.offload.folder_name);
        let offload = Arc::new(OffloadHandler::new(
            config.offload.clone(),
            spill_root.clone(),
            session_id,
            runtime.counter.clone(),
        ));
        let offload_tool = OffloadTool::new(
            spill_root,
            config.offload.folder_name.clone(),
            session_id,
        );

        let executor = Arc::new(LlmExecutor::new(
            runtime.providers,
            runtime.credentials,
            config.temperature,
        ));
        let selection = ModelSelection::new(llm);
        let coordinator = Arc::new(GenerationCoordinator::new(
            executor,
            selection.clone(),
            runtime.dispatcher.clone(),
            config.retry.clone(),
        ));

        let editor = ContextEditor::new(
            config.context_edit.clone(),
            offload.clone(),
            runtime.dispatcher.clone(),
        );
        let summarizer = ContextSummarizer::new(
            config.summarize.clone(),
            coordinator.clone(),
            runtime.catalog,
            runtime.dispatcher.clone(),
            runtime.counter,
        );

        let spec_cache = SpecCache::new(config.spec_api_base.clone());

        Self {
            config,
            session: Session::new(session_id),
            selection,
            coordinator,
            editor,
            summarizer,
            offload,
            offload_tool,
            tools: runtime.tools,
            dispatcher: runtime.dispatcher,
            spec_cache,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn spec_cache(&self) -> &SpecCache {
        &self.spec_cache
    }

    /// The model the next request will start with.
    pub fn current_model(&self) -> ModelRecord {
        self.selection.current()
    }

    /// Explicit sticky-fallback surface: make `record` the new primary for
    /// subsequent turns.
    pub fn promote_model(&self, record: &ModelRecord) {
        self.selection.promote(record);
    }

    // ── Exposed pure transformations ───────────────────────────────

    /// Compact stale oversized tool responses in `messages`.
    pub fn compact_stale_tool_responses(
        &self,
        messages: &[Message],
        current_turn: u32,
    ) -> Vec<Message> {
        self.editor.compact_stale_tool_responses(messages, current_turn)
    }

    /// Summarize everything but the last `keep_last` messages.
    pub async fn summarize_conversation_history(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        keep_last: usize,
    ) -> Vec<Message> {
        self.summarizer
            .summarize_conversation_history(cancel, messages, keep_last, self.session.turn())
            .await
            .messages
    }

    // ── Turn loop ──────────────────────────────────────────────────

    /// Run one user turn to completion and return the final text answer.
    pub async fn run_turn(&mut self, cancel: &CancelToken, user_input: &str) -> Result<String> {
        self.run_turn_inner(cancel, user_input, None).await
    }

    /// Like [`run_turn`], with streamed content delivered to `on_content`.
    pub async fn run_turn_streaming(
        &mut self,
        cancel: &CancelToken,
        user_input: &str,
        on_content: ContentCallback,
    ) -> Result<String> {
        self.run_turn_inner(cancel, user_input, Some(on_content)).await
    }

    async fn run_turn_inner(
        &mut self,
        cancel: &CancelToken,
        user_input: &str,
        on_content: Option<ContentCallback>,
    ) -> Result<String> {
        let turn = self.session.begin_turn();
        self.session.push(Message::user(user_input));

        let mut rounds = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            rounds += 1;
            if rounds > self.config.max_turns {
                return Err(Error::Other(format!(
                    "tool-call budget exhausted after {} rounds",
                    self.config.max_turns
                )));
            }

            self.reduce_context(cancel, turn).await;

            let opts = GenerateOptions {
                tools: self.tool_definitions(),
                stream: on_content.is_some(),
                on_content: on_content.clone(),
                ..Default::default()
            };
            let outcome = self
                .coordinator
                .generate(cancel, self.session.messages(), &opts, turn)
                .await?;
            self.session.record_usage(turn, &outcome.usage);

            let content = outcome
                .response
                .choices
                .first()
                .map(|c| c.content.clone())
                .unwrap_or(MessageContent::Text(String::new()));
            self.session.push(Message {
                role: Role::Assistant,
                content,
            });

            let calls = extract_tool_calls(&outcome.response);
            if calls.is_empty() {
                return Ok(outcome.response.first_text());
            }

            for call in calls {
                let result = self.execute_tool(cancel, turn, &call).await?;
                self.session
                    .push(Message::tool_result(call.call_id, call.tool_name, result));
            }
        }
    }

    /// Run both reducers against the current history. Failures inside the
    /// reducers are non-fatal by construction; the session always holds a
    /// usable history afterwards.
    async fn reduce_context(&mut self, cancel: &CancelToken, turn: u32) {
        let edited = self
            .editor
            .compact_stale_tool_responses(self.session.messages(), turn);
        self.session.replace_messages(edited);

        let model_id = self.selection.current().model_id;
        let result = self
            .summarizer
            .maybe_summarize(
                cancel,
                self.session.messages(),
                self.session.cumulative_total_tokens(),
                &model_id,
                turn,
            )
            .await;
        if result.summarized {
            if let Some(usage) = result.usage {
                self.session.record_usage(0, &usage);
            }
            self.session.replace_messages(result.messages);
        }
    }

    /// Invoke one tool call — the offload virtual tool directly, anything
    /// else through the registry — and offload an oversized result.
    /// Tool failures become error strings in the conversation so the
    /// model can react; only cancellation aborts the turn.
    async fn execute_tool(
        &self,
        cancel: &CancelToken,
        turn: u32,
        call: &ToolCall,
    ) -> Result<String> {
        self.dispatcher.emit(EventPayload::ToolCallStart {
            turn,
            call_id: call.call_id.clone(),
            name: call.tool_name.clone(),
            arguments: call.arguments.to_string(),
        });
        let started = Instant::now();

        let invoked = if call.tool_name == tools::TOOL_NAME {
            self.offload_tool
                .invoke(cancel, &call.tool_name, &call.arguments)
                .await
        } else {
            self.tools
                .invoke(cancel, &call.tool_name, &call.arguments)
                .await
        };

        let result = match invoked {
            Ok(output) => output,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                tracing::warn!(tool = %call.tool_name, error = %e, "tool invocation failed");
                format!("TOOL ERROR: {e}")
            }
        };

        self.dispatcher.emit(EventPayload::ToolCallEnd {
            turn,
            call_id: call.call_id.clone(),
            name: call.tool_name.clone(),
            result: truncate_chars(&result, EVENT_RESULT_PREVIEW),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        match self
            .offload
            .offload(&call.tool_name, &result, PreviewStyle::Fresh)
        {
            Ok(Some(replacement)) => Ok(replacement),
            Ok(None) => Ok(result),
            Err(e) => {
                // Spill failure keeps the oversized result inline; the
                // next context-edit pass gets another chance.
                tracing::warn!(tool = %call.tool_name, error = %e, "offload failed, keeping result inline");
                Ok(result)
            }
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions();
        if self.config.offload.enabled {
            defs.push(OffloadTool::definition());
        }
        defs
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool calls of the first choice, with argument JSON parsed. Unparseable
/// arguments degrade to `{}` so the tool can still report a usable error.
fn extract_tool_calls(response: &GenerationResponse) -> Vec<ToolCall> {
    let Some(choice) = response.choices.first() else {
        return Vec::new();
    };
    let MessageContent::Parts(parts) = &choice.content else {
        return Vec::new();
    };
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let parsed = serde_json::from_str(arguments).unwrap_or_else(|e| {
                    tracing::warn!(tool = %name, error = %e, "tool call carried invalid JSON arguments");
                    serde_json::json!({})
                });
                Some(ToolCall {
                    call_id: call_id.clone(),
                    tool_name: name.clone(),
                    arguments: parsed,
                })
            }
            _ => None,
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}
