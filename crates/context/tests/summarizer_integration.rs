//! Summarization flows end-to-end through the generation pipeline,
//! driven by the scripted mock provider.

use std::sync::Arc;

use ax_context::ContextSummarizer;
use ax_domain::config::{RetryConfig, SummarizeConfig};
use ax_domain::events::EventPayload;
use ax_domain::message::find_tool_call_owner;
use ax_domain::{CancelToken, LlmConfig, Message, ModelMetadata, ModelRecord, Role, TokenCounter};
use ax_events::{CollectingListener, EventDispatcher};
use ax_providers::mock::{MockHub, MockOutcome};
use ax_providers::{
    CredentialPool, GenerationCoordinator, LlmExecutor, ModelSelection, ProviderRegistry,
    StaticModelCatalog,
};

struct Fixture {
    hub: Arc<MockHub>,
    summarizer: ContextSummarizer,
    collector: Arc<CollectingListener>,
    catalog: Arc<StaticModelCatalog>,
}

fn fixture() -> Fixture {
    let hub = MockHub::new();
    let registry = Arc::new(ProviderRegistry::new());
    registry.register("mock", hub.factory());
    let executor = Arc::new(LlmExecutor::new(registry, CredentialPool::default(), None));

    let dispatcher = Arc::new(EventDispatcher::new());
    let collector = Arc::new(CollectingListener::new());
    dispatcher.register(collector.clone());

    let selection = ModelSelection::new(LlmConfig::new(ModelRecord::new("mock", "m1")));
    let coordinator = Arc::new(GenerationCoordinator::new(
        executor,
        selection,
        dispatcher.clone(),
        RetryConfig::default(),
    ));

    let catalog = Arc::new(StaticModelCatalog::new());
    catalog.register(
        "m1",
        ModelMetadata {
            context_window: 1000,
            max_output_tokens: None,
        },
    );

    let summarizer = ContextSummarizer::new(
        SummarizeConfig {
            enabled: true,
            token_threshold_mode: true,
            threshold_percent: 0.8,
            keep_last: 8,
        },
        coordinator,
        catalog.clone(),
        dispatcher,
        TokenCounter::approximate(),
    );

    Fixture {
        hub,
        summarizer,
        collector,
        catalog,
    }
}

/// system + 12 turns of chatter, ending with an assistant tool call and
/// its result followed by 7 plain messages (so `keep_last = 8` puts the
/// desired split exactly on the tool result).
fn history_with_tool_pair_at_boundary() -> Vec<Message> {
    let mut m = vec![Message::system("be helpful")];
    for i in 0..10 {
        m.push(Message::user(format!("question {i}")));
        m.push(Message::assistant(format!("answer {i}")));
    }
    m.push(Message::tool_call("boundary", "search", "{\"q\": \"x\"}"));
    m.push(Message::tool_result("boundary", "search", "findings"));
    for i in 0..6 {
        m.push(Message::user(format!("late question {i}")));
    }
    m.push(Message::assistant("late answer"));
    m
}

#[tokio::test]
async fn summarization_preserves_tool_pair_at_the_boundary() {
    let f = fixture();
    f.hub
        .script("m1", vec![MockOutcome::Text("condensed history".into())]);

    let history = history_with_tool_pair_at_boundary();
    let n = history.len();
    // Desired split n-8 lands on the tool result at n-9's pair boundary:
    // the assistant call sits at n-9, the result at n-8.
    assert!(history[n - 9].has_tool_calls());

    let result = f
        .summarizer
        .summarize_conversation_history(&CancelToken::new(), &history, 8, 5)
        .await;

    assert!(result.summarized);
    let out = result.messages;

    // System message survives at index 0, the summary banner follows.
    assert_eq!(out[0].role, Role::System);
    match &out[1].content {
        ax_domain::MessageContent::Text(t) => {
            assert!(t.starts_with("=== CONVERSATION SUMMARY"));
            assert!(t.contains("condensed history"));
            assert!(t.ends_with("=== END SUMMARY ==="));
        }
        other => panic!("unexpected banner content {other:?}"),
    }

    // Both halves of the boundary pair were kept.
    let kept_call = out.iter().position(|m| m.has_tool_calls()).expect("call kept");
    let kept_result = out
        .iter()
        .position(|m| m.as_tool_result().is_some())
        .expect("result kept");
    assert_eq!(kept_result, kept_call + 1);

    // No orphaned results anywhere in the rebuilt history.
    for (i, m) in out.iter().enumerate() {
        if let Some((call_id, _, _)) = m.as_tool_result() {
            assert!(
                find_tool_call_owner(&out, call_id, i).is_some(),
                "orphaned tool result at index {i}"
            );
        }
    }

    // The summarization request itself excluded the system message.
    let call = &f.hub.calls()[0];
    assert_eq!(call.message_count, 2);

    let completed = f
        .collector
        .payloads_of_kind("context_summarization_completed");
    assert_eq!(completed.len(), 1);
    match &completed[0] {
        EventPayload::ContextSummarizationCompleted {
            messages_before,
            messages_after,
            summary,
            ..
        } => {
            assert_eq!(*messages_before, n);
            assert_eq!(*messages_after, out.len());
            assert_eq!(summary, "condensed history");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn failed_summarization_returns_history_unchanged() {
    let f = fixture();
    // The pipeline has a single model; an internal error exhausts the chain.
    f.hub
        .script("m1", vec![MockOutcome::Fail("INTERNAL_ERROR".into())]);

    let history = history_with_tool_pair_at_boundary();
    let result = f
        .summarizer
        .summarize_conversation_history(&CancelToken::new(), &history, 8, 5)
        .await;

    assert!(!result.summarized);
    assert_eq!(result.messages.len(), history.len());
    assert!(result.usage.is_none());

    let errors = f.collector.payloads_of_kind("context_summarization_error");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        f.collector
            .payloads_of_kind("context_summarization_started")
            .len(),
        1
    );
}

#[tokio::test]
async fn trigger_requires_catalog_metadata() {
    let f = fixture();
    // 900 of 1000-token window at 80% threshold: fires.
    assert!(f.summarizer.should_summarize(900, "m1"));
    // Below threshold: declines.
    assert!(!f.summarizer.should_summarize(700, "m1"));
    // Unknown model: declines instead of failing.
    assert!(!f.summarizer.should_summarize(900_000, "unknown-model"));

    // Registering metadata later turns the trigger on.
    f.catalog.register(
        "late-model",
        ModelMetadata {
            context_window: 100,
            max_output_tokens: None,
        },
    );
    assert!(f.summarizer.should_summarize(80, "late-model"));
}

#[tokio::test]
async fn short_history_is_left_alone_without_events() {
    let f = fixture();
    let history = vec![Message::user("hi"), Message::assistant("hello")];
    let result = f
        .summarizer
        .summarize_conversation_history(&CancelToken::new(), &history, 8, 1)
        .await;

    assert!(!result.summarized);
    assert!(f.hub.calls().is_empty());
    assert!(f
        .collector
        .payloads_of_kind("context_summarization_started")
        .is_empty());
}

#[tokio::test]
async fn summarizer_usage_is_reported_for_turn_zero_accounting() {
    let f = fixture();
    f.hub.script("m1", vec![MockOutcome::Text("digest".into())]);

    let history = history_with_tool_pair_at_boundary();
    let result = f
        .summarizer
        .summarize_conversation_history(&CancelToken::new(), &history, 8, 3)
        .await;

    // The mock reports usage; it must surface for session accounting.
    let usage = result.usage.expect("usage present");
    assert!(usage.total_tokens > 0);
}
