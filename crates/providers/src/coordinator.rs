//! Generation coordination: retry on the same model, fallback across the
//! ranked model list.
//!
//! Two composed loops, kept deliberately separate: the outer loop walks
//! `[primary, fallbacks…]` monotonically (a model is never revisited
//! within one request), the inner loop retries the *same* model for the
//! error kinds that warrant it (throttling, zero candidates) with
//! exponential backoff. Every transition emits a lifecycle event before
//! the coordinator returns.
//!
//! Cancellation is observed at the top of every inner iteration, inside
//! every backoff sleep, and on errors surfaced from the provider call
//! itself. `ContextCancelled` is emitted exactly once per request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use ax_domain::config::RetryConfig;
use ax_domain::events::{EventPayload, FallbackPhase};
use ax_domain::{
    CancelToken, Error, ErrorKind, GenerationResponse, LlmConfig, Message, ModelRecord, Result,
    UsageMetrics,
};
use ax_events::EventDispatcher;

use crate::classify::classify;
use crate::executor::LlmExecutor;
use crate::streaming::StreamRelay;
use crate::traits::GenerateOptions;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model selection (sticky fallback)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The agent's current model chain. Written when a fallback is engaged so
/// subsequent turns start with the model that is actually working instead
/// of re-walking a broken primary. Promotion is an explicit method here,
/// not a hidden side effect buried in the retry loop.
pub struct ModelSelection {
    inner: RwLock<LlmConfig>,
}

impl ModelSelection {
    pub fn new(config: LlmConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(config),
        })
    }

    /// Snapshot of the full chain.
    pub fn config(&self) -> LlmConfig {
        self.inner.read().clone()
    }

    /// The model a new request starts with.
    pub fn current(&self) -> ModelRecord {
        self.inner.read().primary.clone()
    }

    /// Make `record` the new primary. The displaced primary and the
    /// remaining fallbacks keep their relative order behind it.
    pub fn promote(&self, record: &ModelRecord) {
        let mut inner = self.inner.write();
        if inner.primary == *record {
            return;
        }
        let mut chain: Vec<ModelRecord> = Vec::with_capacity(1 + inner.fallbacks.len());
        chain.push(inner.primary.clone());
        chain.extend(inner.fallbacks.iter().cloned());
        chain.retain(|m| m != record);
        inner.primary = record.clone();
        inner.fallbacks = chain;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a successful generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub response: GenerationResponse,
    pub usage: UsageMetrics,
    /// The model that produced the response (primary or a fallback).
    pub model: ModelRecord,
}

pub struct GenerationCoordinator {
    executor: Arc<LlmExecutor>,
    selection: Arc<ModelSelection>,
    dispatcher: Arc<EventDispatcher>,
    retry: RetryConfig,
}

impl GenerationCoordinator {
    pub fn new(
        executor: Arc<LlmExecutor>,
        selection: Arc<ModelSelection>,
        dispatcher: Arc<EventDispatcher>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            executor,
            selection,
            dispatcher,
            retry,
        }
    }

    pub fn selection(&self) -> &Arc<ModelSelection> {
        &self.selection
    }

    /// Run one generation request through the retry/fallback machinery.
    pub async fn generate(
        &self,
        cancel: &CancelToken,
        messages: &[Message],
        opts: &GenerateOptions,
        turn: u32,
    ) -> Result<GenerationOutcome> {
        let models = self.selection.config().models();
        let primary_id = models[0].qualified_id();
        let mut last_error: Option<Error> = None;
        let mut cancelled_emitted = false;

        'models: for (m, model) in models.iter().enumerate() {
            let model_id = model.qualified_id();

            if m > 0 {
                self.dispatcher.emit(EventPayload::FallbackModelUsed {
                    from_model: primary_id.clone(),
                    to_model: model_id.clone(),
                    reason: "fallback_chain".into(),
                });
                self.selection.promote(model);
            }

            for attempt in 0..self.retry.max_retries {
                if cancel.is_cancelled() {
                    return Err(self.cancellation(turn, &mut cancelled_emitted));
                }

                self.dispatcher.emit(EventPayload::LlmGenerationWithRetry {
                    turn,
                    model: model_id.clone(),
                    attempt,
                    max_retries: self.retry.max_retries,
                });

                // Streaming is only engaged on the very first attempt of the
                // request; retries and fallbacks run unstreamed.
                let mut attempt_opts = opts.clone();
                let relay = if m == 0 && attempt == 0 && opts.stream {
                    let relay =
                        StreamRelay::spawn(turn, self.dispatcher.clone(), opts.on_content.clone());
                    attempt_opts.chunk_sink = Some(relay.sender());
                    self.dispatcher.emit(EventPayload::StreamingStart {
                        turn,
                        model: model_id.clone(),
                    });
                    Some(relay)
                } else {
                    None
                };

                let result = self
                    .executor
                    .execute(cancel, model, messages, &attempt_opts)
                    .await;
                // Close our half of the chunk channel before draining the
                // relay, or the worker never observes the end of stream.
                attempt_opts.chunk_sink = None;

                match result {
                    Ok(response) => {
                        let usage = response.resolved_usage();
                        if let Some(relay) = relay {
                            self.finish_streaming(relay, &response, &usage).await;
                        }
                        if m > 0 {
                            self.dispatcher.emit(EventPayload::FallbackAttempt {
                                phase: FallbackPhase::FallbackChain,
                                from_model: primary_id.clone(),
                                to_model: model_id.clone(),
                                attempt,
                                success: true,
                            });
                            self.dispatcher.emit(EventPayload::ModelChange {
                                from_model: primary_id.clone(),
                                to_model: model_id.clone(),
                                reason: "fallback_success".into(),
                            });
                        }
                        return Ok(GenerationOutcome {
                            response,
                            usage,
                            model: model.clone(),
                        });
                    }
                    Err(err) => {
                        if let Some(relay) = relay {
                            let (stats, elapsed) = relay.finish().await;
                            self.dispatcher.emit(EventPayload::StreamingEnd {
                                total_chunks: stats.total_chunks,
                                duration_ms: elapsed.as_millis() as u64,
                                finish_reason: None,
                                total_tokens: None,
                            });
                        }

                        let kind = classify(&err);

                        // A context error from inside the provider call is a
                        // cancellation, not a transport failure.
                        if kind == ErrorKind::Cancelled {
                            return Err(self.cancellation(turn, &mut cancelled_emitted));
                        }

                        self.dispatcher.emit(EventPayload::LlmGenerationError {
                            turn,
                            model: model_id.clone(),
                            error: err.to_string(),
                        });

                        match kind {
                            ErrorKind::Throttling if attempt + 1 < self.retry.max_retries => {
                                let delay = self.retry.backoff_delay(attempt);
                                tracing::warn!(
                                    model = %model_id,
                                    attempt,
                                    delay_secs = delay.as_secs(),
                                    "model throttled, backing off"
                                );
                                self.dispatcher.emit(EventPayload::ThrottlingDetected {
                                    model: model_id.clone(),
                                    attempt,
                                    delay_secs: delay.as_secs(),
                                });
                                self.emit_retry_attempt(&model_id, attempt);
                                if !self.sleep_interruptible(cancel, delay).await {
                                    return Err(self.cancellation(turn, &mut cancelled_emitted));
                                }
                                last_error = Some(err);
                            }
                            ErrorKind::ZeroCandidates
                                if attempt + 1 < self.retry.max_retries_zero_candidates =>
                            {
                                let delay = self.retry.backoff_delay(attempt);
                                self.emit_retry_attempt(&model_id, attempt);
                                if !self.sleep_interruptible(cancel, delay).await {
                                    return Err(self.cancellation(turn, &mut cancelled_emitted));
                                }
                                last_error = Some(err);
                            }
                            ErrorKind::Unclassified => {
                                // Unknown failures are returned to the caller
                                // untouched; guessing a fallback hides bugs.
                                return Err(err);
                            }
                            _ => {
                                // Non-retryable on this model, or the retry
                                // budget is exhausted: advance down the chain.
                                tracing::warn!(
                                    model = %model_id,
                                    kind = %kind,
                                    error = %err,
                                    "model failed, advancing down the fallback chain"
                                );
                                if m > 0 {
                                    self.dispatcher.emit(EventPayload::FallbackAttempt {
                                        phase: FallbackPhase::FallbackChain,
                                        from_model: primary_id.clone(),
                                        to_model: model_id.clone(),
                                        attempt,
                                        success: false,
                                    });
                                }
                                last_error = Some(err);
                                continue 'models;
                            }
                        }
                    }
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".into());
        Err(Error::provider(
            "pipeline",
            format!(
                "all LLMs failed (1 primary + {} fallbacks): {detail}",
                models.len() - 1
            ),
        ))
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Emit `ContextCancelled` exactly once, then produce the context error.
    fn cancellation(&self, turn: u32, emitted: &mut bool) -> Error {
        if !*emitted {
            self.dispatcher
                .emit(EventPayload::ContextCancelled { turn });
            *emitted = true;
        }
        Error::Cancelled
    }

    fn emit_retry_attempt(&self, model_id: &str, attempt: u32) {
        self.dispatcher.emit(EventPayload::FallbackAttempt {
            phase: FallbackPhase::Retry,
            from_model: model_id.to_owned(),
            to_model: model_id.to_owned(),
            attempt,
            success: false,
        });
    }

    /// Sleep for `delay`, returning false when cancelled mid-wait.
    async fn sleep_interruptible(&self, cancel: &CancelToken, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn finish_streaming(
        &self,
        relay: StreamRelay,
        response: &GenerationResponse,
        usage: &UsageMetrics,
    ) {
        let (stats, elapsed) = relay.finish().await;
        let total_tokens = (usage.total_tokens > 0).then_some(usage.total_tokens);
        self.dispatcher.emit(EventPayload::StreamingEnd {
            total_chunks: stats.total_chunks,
            duration_ms: elapsed.as_millis() as u64,
            finish_reason: response.stop_reason().map(str::to_owned),
            total_tokens,
        });
    }
}
