//! In-place compaction of stale oversized tool responses.
//!
//! Runs before each generation. Every tool-result message is evaluated
//! against two thresholds: token count (strictly greater than) and turn
//! age (greater or equal). Both must hold for a response to be spilled to
//! disk and replaced with a short reference payload; everything else —
//! including content that was already compacted in an earlier turn — is
//! left alone and recorded in the completion event with the reason.
//!
//! The input slice is never mutated; callers get a fresh list.

use std::sync::Arc;

use ax_domain::config::ContextEditConfig;
use ax_domain::events::{EventPayload, ToolResponseEvaluation};
use ax_domain::{Message, Role};
use ax_events::EventDispatcher;
use ax_offload::{extract_actual_content, OffloadHandler, PreviewStyle};

/// Marker substring identifying an already-compacted payload.
const COMPACTED_MARKER: &str = "has been saved to:";

pub struct ContextEditor {
    config: ContextEditConfig,
    handler: Arc<OffloadHandler>,
    dispatcher: Arc<EventDispatcher>,
}

impl ContextEditor {
    pub fn new(
        config: ContextEditConfig,
        handler: Arc<OffloadHandler>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            config,
            handler,
            dispatcher,
        }
    }

    /// Compact stale oversized tool responses, returning the new history.
    ///
    /// Idempotent within a turn: replacement payloads carry the compacted
    /// marker and are skipped on re-evaluation.
    pub fn compact_stale_tool_responses(
        &self,
        messages: &[Message],
        current_turn: u32,
    ) -> Vec<Message> {
        let mut out: Vec<Message> = messages.to_vec();

        if !self.config.enabled
            || current_turn <= self.config.turn_threshold
            || !out.iter().any(|m| m.as_tool_result().is_some())
        {
            return out;
        }

        let counter = self.handler.counter().clone();
        let mut evaluations: Vec<ToolResponseEvaluation> = Vec::new();
        let mut tool_responses = 0usize;
        let mut compacted = 0usize;
        let mut tokens_saved = 0usize;
        let mut users_before = 0u32;

        for message in out.iter_mut() {
            let is_user = message.role == Role::User;

            if let Some((_, tool_name, content)) = message.as_tool_result() {
                let tool_name = tool_name.to_owned();
                let content = content.to_owned();
                tool_responses += 1;

                let tokens = counter.count(&content);
                // A tool result created in turn N appears after N user
                // messages; index position gives us its creation turn.
                let creation_turn = 1 + users_before;
                let turn_age = current_turn.saturating_sub(creation_turn);

                if content.contains(COMPACTED_MARKER)
                    || content.contains(self.handler.folder_name())
                {
                    evaluations.push(ToolResponseEvaluation {
                        tool_name,
                        tokens,
                        turn_age,
                        meets_token_threshold: false,
                        meets_turn_threshold: false,
                        was_compacted: false,
                        skip_reason: Some("already compacted".into()),
                    });
                    continue;
                }

                let meets_token = tokens > self.config.token_threshold;
                let meets_turn = turn_age >= self.config.turn_threshold;

                if meets_token && meets_turn {
                    let raw = extract_actual_content(&content);
                    match self.handler.write(&tool_name, &raw) {
                        Ok(spill) => {
                            let payload = self.handler.replacement_payload(
                                &tool_name,
                                &spill,
                                &raw,
                                PreviewStyle::Historical,
                            );
                            tokens_saved += tokens.saturating_sub(counter.count(&payload));
                            if let Some(slot) = message.tool_result_content_mut() {
                                *slot = payload;
                            }
                            compacted += 1;
                            evaluations.push(ToolResponseEvaluation {
                                tool_name,
                                tokens,
                                turn_age,
                                meets_token_threshold: true,
                                meets_turn_threshold: true,
                                was_compacted: true,
                                skip_reason: None,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(tool = %tool_name, error = %e, "spill failed, leaving tool response inline");
                            evaluations.push(ToolResponseEvaluation {
                                tool_name,
                                tokens,
                                turn_age,
                                meets_token_threshold: true,
                                meets_turn_threshold: true,
                                was_compacted: false,
                                skip_reason: Some(format!("spill failed: {e}")),
                            });
                        }
                    }
                } else {
                    let skip_reason = if !meets_token {
                        format!(
                            "tokens {tokens} <= threshold {}",
                            self.config.token_threshold
                        )
                    } else {
                        format!(
                            "turn_age {turn_age} < threshold {}",
                            self.config.turn_threshold
                        )
                    };
                    evaluations.push(ToolResponseEvaluation {
                        tool_name,
                        tokens,
                        turn_age,
                        meets_token_threshold: meets_token,
                        meets_turn_threshold: meets_turn,
                        was_compacted: false,
                        skip_reason: Some(skip_reason),
                    });
                }
            }

            if is_user {
                users_before += 1;
            }
        }

        self.dispatcher.emit(EventPayload::ContextEditingCompleted {
            total_messages: out.len(),
            tool_responses,
            compacted,
            tokens_saved,
            evaluations,
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_domain::config::OffloadConfig;
    use ax_domain::TokenCounter;
    use ax_events::CollectingListener;

    struct Fixture {
        _dir: tempfile::TempDir,
        editor: ContextEditor,
        collector: Arc<CollectingListener>,
    }

    // token_threshold 100 (approximate counter: 400 chars), turn_threshold 3.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(OffloadHandler::new(
            OffloadConfig {
                enabled: true,
                token_threshold: 100,
                folder_name: "tool_output_folder".into(),
            },
            dir.path(),
            "sess1",
            TokenCounter::approximate(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new());
        let collector = Arc::new(CollectingListener::new());
        dispatcher.register(collector.clone());
        let editor = ContextEditor::new(
            ContextEditConfig {
                enabled: true,
                token_threshold: 100,
                turn_threshold: 3,
                preview_ratio: 0.1,
            },
            handler,
            dispatcher,
        );
        Fixture {
            _dir: dir,
            editor,
            collector,
        }
    }

    fn history_with_old_result(content: &str) -> Vec<Message> {
        vec![
            Message::user("turn 1"),
            Message::tool_call("c1", "fetch", "{}"),
            Message::tool_result("c1", "fetch", content),
            Message::assistant("done"),
            Message::user("turn 2"),
            Message::assistant("sure"),
        ]
    }

    fn completion_event(collector: &CollectingListener) -> (usize, usize, Vec<ToolResponseEvaluation>) {
        match collector
            .payloads_of_kind("context_editing_completed")
            .pop()
            .expect("completion event")
        {
            EventPayload::ContextEditingCompleted {
                compacted,
                tool_responses,
                evaluations,
                ..
            } => (compacted, tool_responses, evaluations),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn stale_large_result_is_compacted_in_place() {
        let f = fixture();
        let big = "x".repeat(2000); // 500 tokens
        let history = history_with_old_result(&big);

        let out = f.editor.compact_stale_tool_responses(&history, 10);

        let (call_id, tool_name, content) = out[2].as_tool_result().unwrap();
        assert_eq!(call_id, "c1");
        assert_eq!(tool_name, "fetch");
        assert!(content.contains("has been saved to:"));
        assert!(content.len() < big.len());

        // Input snapshot untouched.
        let (_, _, original) = history[2].as_tool_result().unwrap();
        assert_eq!(original.len(), 2000);

        let (compacted, tool_responses, _) = completion_event(&f.collector);
        assert_eq!(compacted, 1);
        assert_eq!(tool_responses, 1);
    }

    #[test]
    fn compaction_is_idempotent_within_a_turn() {
        let f = fixture();
        let history = history_with_old_result(&"x".repeat(2000));

        let once = f.editor.compact_stale_tool_responses(&history, 10);
        f.collector.clear();
        let twice = f.editor.compact_stale_tool_responses(&once, 10);

        let (_, _, a) = once[2].as_tool_result().unwrap();
        let (_, _, b) = twice[2].as_tool_result().unwrap();
        assert_eq!(a, b);

        let (compacted, _, evaluations) = completion_event(&f.collector);
        assert_eq!(compacted, 0);
        assert_eq!(
            evaluations[0].skip_reason.as_deref(),
            Some("already compacted")
        );
    }

    #[test]
    fn tokens_exactly_at_threshold_do_not_compact() {
        let f = fixture();
        // 400 chars == 100 tokens: equal, and the comparison is strict.
        let history = history_with_old_result(&"x".repeat(400));
        let out = f.editor.compact_stale_tool_responses(&history, 10);

        let (_, _, content) = out[2].as_tool_result().unwrap();
        assert_eq!(content.len(), 400);

        let (_, _, evaluations) = completion_event(&f.collector);
        assert!(!evaluations[0].meets_token_threshold);
        assert!(evaluations[0]
            .skip_reason
            .as_deref()
            .unwrap()
            .contains("tokens 100 <= threshold 100"));
    }

    #[test]
    fn turn_age_exactly_at_threshold_does_compact() {
        let f = fixture();
        let history = history_with_old_result(&"x".repeat(2000));
        // Result created in turn 1; current_turn 4 gives age 3 == threshold.
        let out = f.editor.compact_stale_tool_responses(&history, 4);
        let (_, _, content) = out[2].as_tool_result().unwrap();
        assert!(content.contains("has been saved to:"));
    }

    #[test]
    fn young_result_is_skipped_with_turn_reason() {
        let f = fixture();
        let mut history = history_with_old_result(&"x".repeat(2000));
        // Push the result into a later turn: two more user messages before it.
        history.insert(1, Message::user("turn 2"));
        history.insert(2, Message::user("turn 3"));

        let out = f.editor.compact_stale_tool_responses(&history, 5);
        let (_, _, content) = out[4].as_tool_result().unwrap();
        assert_eq!(content.len(), 2000);

        let (_, _, evaluations) = completion_event(&f.collector);
        assert!(evaluations[0].meets_token_threshold);
        assert!(!evaluations[0].meets_turn_threshold);
        assert!(evaluations[0]
            .skip_reason
            .as_deref()
            .unwrap()
            .contains("turn_age 1 < threshold 3"));
    }

    #[test]
    fn short_circuits_below_turn_threshold_without_event() {
        let f = fixture();
        let history = history_with_old_result(&"x".repeat(2000));
        // current_turn == turn_threshold short-circuits entirely.
        let out = f.editor.compact_stale_tool_responses(&history, 3);
        let (_, _, content) = out[2].as_tool_result().unwrap();
        assert_eq!(content.len(), 2000);
        assert!(f
            .collector
            .payloads_of_kind("context_editing_completed")
            .is_empty());
    }

    #[test]
    fn call_pairing_survives_compaction() {
        let f = fixture();
        let history = history_with_old_result(&"x".repeat(2000));
        let out = f.editor.compact_stale_tool_responses(&history, 10);

        for (i, m) in out.iter().enumerate() {
            if let Some((call_id, _, _)) = m.as_tool_result() {
                assert!(
                    ax_domain::message::find_tool_call_owner(&out, call_id, i).is_some(),
                    "orphaned tool result at {i}"
                );
            }
        }
    }

    #[test]
    fn evaluations_cover_every_tool_response() {
        let f = fixture();
        let mut history = history_with_old_result(&"x".repeat(2000));
        history.push(Message::tool_call("c2", "grep", "{}"));
        history.push(Message::tool_result("c2", "grep", "small"));

        f.editor.compact_stale_tool_responses(&history, 10);
        let (compacted, tool_responses, evaluations) = completion_event(&f.collector);
        assert_eq!(tool_responses, 2);
        assert_eq!(evaluations.len(), 2);
        assert_eq!(compacted, 1);
        assert_eq!(evaluations[1].tool_name, "grep");
        assert!(!evaluations[1].was_compacted);
    }
}
