//! Scripted mock provider.
//!
//! Tests script a queue of outcomes per model id; the mock pops one per
//! `generate` call and records everything it saw (resolved credentials,
//! temperature, message count, whether a chunk sink was attached). This is
//! how the coordinator's retry/fallback behaviour is exercised without a
//! network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use ax_domain::{
    CancelToken, ContentPart, Error, GenerationResponse, Message, MessageContent, ModelRecord,
    Result, StreamChunk, UsageMetrics,
};

use crate::traits::{GenerateOptions, Provider, ProviderFactory, ResolvedCredentials};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted outcomes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub enum MockOutcome {
    /// Succeed with a plain text response.
    Text(String),
    /// Succeed with a fully specified response.
    Response(GenerationResponse),
    /// Succeed with a single tool call.
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// Fail with a provider error carrying this message.
    Fail(String),
    /// Fail with a cancellation error, as a provider observing a dead
    /// request context would.
    FailCancelled,
}

/// What the mock saw on one `generate` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider_id: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub temperature: Option<f32>,
    pub message_count: usize,
    pub streamed: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hub
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared state behind every mock provider the factory builds.
#[derive(Default)]
pub struct MockHub {
    scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue outcomes for a model id. Later calls append.
    pub fn script(self: &Arc<Self>, model_id: &str, outcomes: Vec<MockOutcome>) {
        self.scripts
            .lock()
            .entry(model_id.to_owned())
            .or_default()
            .extend(outcomes);
    }

    /// Everything recorded so far, in call order.
    pub fn calls(self: &Arc<Self>) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(self: &Arc<Self>, model_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.model_id == model_id)
            .count()
    }

    /// A factory that builds providers backed by this hub.
    pub fn factory(self: &Arc<Self>) -> Arc<dyn ProviderFactory> {
        Arc::new(MockFactory { hub: self.clone() })
    }

    fn pop(self: &Arc<Self>, model_id: &str) -> MockOutcome {
        self.scripts
            .lock()
            .get_mut(model_id)
            .and_then(|q| q.pop_front())
            // Unscripted models succeed; keeps happy-path tests short.
            .unwrap_or_else(|| MockOutcome::Text("ok".into()))
    }
}

struct MockFactory {
    hub: Arc<MockHub>,
}

impl ProviderFactory for MockFactory {
    fn build(
        &self,
        record: &ModelRecord,
        credentials: &ResolvedCredentials,
    ) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(MockProvider {
            hub: self.hub.clone(),
            provider_id: record.provider_id.clone(),
            model_id: record.model_id.clone(),
            credentials: credentials.clone(),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MockProvider {
    hub: Arc<MockHub>,
    provider_id: String,
    model_id: String,
    credentials: ResolvedCredentials,
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn generate(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<GenerationResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.hub.calls.lock().push(RecordedCall {
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
            api_key: self.credentials.api_key.clone(),
            region: self.credentials.region.clone(),
            temperature: opts.temperature,
            message_count: messages.len(),
            streamed: opts.chunk_sink.is_some(),
        });

        match self.hub.pop(&self.model_id) {
            MockOutcome::Text(text) => {
                if let Some(sink) = &opts.chunk_sink {
                    // Stream the text in two fragments the way a real
                    // adapter would deliver deltas.
                    let mid = text.len() / 2;
                    let mid = (0..=mid)
                        .rev()
                        .find(|i| text.is_char_boundary(*i))
                        .unwrap_or(0);
                    for (i, piece) in [&text[..mid], &text[mid..]].iter().enumerate() {
                        if !piece.is_empty() {
                            let _ = sink
                                .send(StreamChunk::Content {
                                    text: (*piece).to_owned(),
                                    index: i as u32,
                                })
                                .await;
                        }
                    }
                }
                let mut resp = GenerationResponse::text(text);
                resp.usage = Some(UsageMetrics {
                    input_tokens: 10,
                    output_tokens: 5,
                    ..Default::default()
                });
                Ok(resp)
            }
            MockOutcome::Response(resp) => Ok(resp),
            MockOutcome::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                if let Some(sink) = &opts.chunk_sink {
                    let _ = sink
                        .send(StreamChunk::ToolCallStart {
                            call_id: call_id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        })
                        .await;
                }
                Ok(GenerationResponse {
                    choices: vec![ax_domain::Choice {
                        content: MessageContent::Parts(vec![ContentPart::ToolCall {
                            call_id,
                            name,
                            arguments,
                        }]),
                        stop_reason: Some("tool_calls".into()),
                        usage: None,
                    }],
                    usage: Some(UsageMetrics {
                        input_tokens: 10,
                        output_tokens: 5,
                        ..Default::default()
                    }),
                })
            }
            MockOutcome::Fail(message) => Err(Error::provider(&self.provider_id, message)),
            MockOutcome::FailCancelled => Err(Error::Cancelled),
        }
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_pop_in_order() {
        let hub = MockHub::new();
        hub.script(
            "m1",
            vec![
                MockOutcome::Fail("HTTP 429".into()),
                MockOutcome::Text("second".into()),
            ],
        );
        let provider = hub
            .factory()
            .build(&ModelRecord::new("mock", "m1"), &ResolvedCredentials::default())
            .unwrap();

        let cancel = CancelToken::new();
        let first = provider
            .generate(&cancel, &[Message::user("q")], &GenerateOptions::default())
            .await;
        assert!(first.is_err());

        let second = provider
            .generate(&cancel, &[Message::user("q")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(second.first_text(), "second");
        assert_eq!(hub.calls_for("m1"), 2);
    }

    #[tokio::test]
    async fn unscripted_model_defaults_to_ok() {
        let hub = MockHub::new();
        let provider = hub
            .factory()
            .build(&ModelRecord::new("mock", "anything"), &ResolvedCredentials::default())
            .unwrap();
        let resp = provider
            .generate(&CancelToken::new(), &[], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.first_text(), "ok");
    }

    #[tokio::test]
    async fn streams_content_into_attached_sink() {
        let hub = MockHub::new();
        hub.script("m1", vec![MockOutcome::Text("hello world".into())]);
        let provider = hub
            .factory()
            .build(&ModelRecord::new("mock", "m1"), &ResolvedCredentials::default())
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let opts = GenerateOptions {
            chunk_sink: Some(tx),
            ..Default::default()
        };
        provider
            .generate(&CancelToken::new(), &[], &opts)
            .await
            .unwrap();
        drop(opts);

        let mut streamed = String::new();
        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::Content { text, .. } = chunk {
                streamed.push_str(&text);
            }
        }
        assert_eq!(streamed, "hello world");
        assert!(hub.calls()[0].streamed);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let hub = MockHub::new();
        let provider = hub
            .factory()
            .build(&ModelRecord::new("mock", "m1"), &ResolvedCredentials::default())
            .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = provider
            .generate(&cancel, &[], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        // Nothing recorded: the call never reached the provider logic.
        assert!(hub.calls().is_empty());
    }
}
