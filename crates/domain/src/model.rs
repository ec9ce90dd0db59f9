use serde::{Deserialize, Serialize};

use crate::message::MessageContent;

/// A single model in a fallback chain. Immutable for the duration of a
/// request; credentials and region override the agent-level pool when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub provider_id: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelRecord {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            api_key: None,
            region: None,
            temperature: None,
        }
    }

    /// `provider_id/model_id`, the display form used in events and logs.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }
}

/// Effective model configuration: one primary plus an ordered fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub primary: ModelRecord,
    #[serde(default)]
    pub fallbacks: Vec<ModelRecord>,
}

impl LlmConfig {
    pub fn new(primary: ModelRecord) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallbacks(primary: ModelRecord, fallbacks: Vec<ModelRecord>) -> Self {
        Self { primary, fallbacks }
    }

    /// The effective try-order: `[primary, fallbacks…]`.
    pub fn models(&self) -> Vec<ModelRecord> {
        let mut out = Vec::with_capacity(1 + self.fallbacks.len());
        out.push(self.primary.clone());
        out.extend(self.fallbacks.iter().cloned());
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage metrics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Token usage reported by a provider. Zeros mean "not reported" — the
/// pipeline never estimates missing counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub cache_tokens: u32,
    #[serde(default)]
    pub thoughts_tokens: u32,
    #[serde(default)]
    pub reasoning_tokens: u32,
}

impl UsageMetrics {
    /// Fill in `total_tokens` as `input + output` when the provider
    /// omitted it.
    pub fn normalized(mut self) -> Self {
        if self.total_tokens == 0 {
            self.total_tokens = self.input_tokens + self.output_tokens;
        }
        self
    }

    /// True when the provider reported nothing at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Accumulate another usage record into this one.
    pub fn accumulate(&mut self, other: &UsageMetrics) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cache_tokens += other.cache_tokens;
        self.thoughts_tokens += other.thoughts_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generation response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
}

impl GenerationResponse {
    /// A single-choice text response (mock and test helper).
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                content: MessageContent::Text(content.into()),
                stop_reason: Some("stop".into()),
                usage: None,
            }],
            usage: None,
        }
    }

    /// Resolved usage: the envelope record supersedes per-choice info.
    pub fn resolved_usage(&self) -> UsageMetrics {
        self.usage
            .or_else(|| self.choices.first().and_then(|c| c.usage))
            .unwrap_or_default()
            .normalized()
    }

    /// Stop reason of the first choice, if any.
    pub fn stop_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.stop_reason.as_deref())
    }

    /// Text of the first choice (joined text parts).
    pub fn first_text(&self) -> String {
        self.choices
            .first()
            .map(|c| c.content.extract_all_text())
            .unwrap_or_default()
    }
}

/// Per-model metadata served by the model catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub context_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_puts_primary_first() {
        let cfg = LlmConfig::with_fallbacks(
            ModelRecord::new("bedrock", "claude"),
            vec![
                ModelRecord::new("vertex", "gemini"),
                ModelRecord::new("openai", "gpt"),
            ],
        );
        let models = cfg.models();
        assert_eq!(models.len(), 3);
        assert_eq!(models[0].model_id, "claude");
        assert_eq!(models[1].model_id, "gemini");
        assert_eq!(models[2].model_id, "gpt");
    }

    #[test]
    fn usage_normalized_derives_total() {
        let usage = UsageMetrics {
            input_tokens: 100,
            output_tokens: 20,
            ..Default::default()
        }
        .normalized();
        assert_eq!(usage.total_tokens, 120);
    }

    #[test]
    fn usage_normalized_keeps_reported_total() {
        let usage = UsageMetrics {
            input_tokens: 100,
            output_tokens: 20,
            total_tokens: 130, // provider counted cache tokens into total
            ..Default::default()
        }
        .normalized();
        assert_eq!(usage.total_tokens, 130);
    }

    #[test]
    fn envelope_usage_supersedes_choice_usage() {
        let resp = GenerationResponse {
            choices: vec![Choice {
                content: MessageContent::Text("hi".into()),
                stop_reason: None,
                usage: Some(UsageMetrics {
                    input_tokens: 1,
                    ..Default::default()
                }),
            }],
            usage: Some(UsageMetrics {
                input_tokens: 50,
                output_tokens: 5,
                ..Default::default()
            }),
        };
        assert_eq!(resp.resolved_usage().input_tokens, 50);
        assert_eq!(resp.resolved_usage().total_tokens, 55);
    }

    #[test]
    fn choice_usage_used_when_envelope_missing() {
        let resp = GenerationResponse {
            choices: vec![Choice {
                content: MessageContent::Text("hi".into()),
                stop_reason: None,
                usage: Some(UsageMetrics {
                    input_tokens: 7,
                    output_tokens: 3,
                    ..Default::default()
                }),
            }],
            usage: None,
        };
        assert_eq!(resp.resolved_usage().total_tokens, 10);
    }

    #[test]
    fn missing_usage_stays_zero() {
        let resp = GenerationResponse::text("hello");
        assert!(resp.resolved_usage().is_empty());
    }
}
