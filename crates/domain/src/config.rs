//! Configuration for the generation pipeline and the context reducers.
//!
//! All structs deserialize with sensible defaults; `from_env` constructors
//! apply the documented environment overrides on top. Malformed env values
//! fall back to the default with a warning rather than failing startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry / fallback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per model for throttling errors.
    #[serde(default = "d_5")]
    pub max_retries: u32,
    /// Attempts per model for zero-candidate responses. Fixed by policy,
    /// not env-overridable.
    #[serde(default = "d_3")]
    pub max_retries_zero_candidates: u32,
    /// First backoff delay in seconds.
    #[serde(default = "d_10")]
    pub base_delay_secs: u64,
    /// Backoff ceiling in seconds.
    #[serde(default = "d_300")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_retries_zero_candidates: 3,
            base_delay_secs: 10,
            max_delay_secs: 300,
        }
    }
}

impl RetryConfig {
    /// Defaults with `LLM_MAX_RETRIES`, `LLM_RETRY_BASE_DELAY_SECONDS` and
    /// `LLM_RETRY_MAX_DELAY_SECONDS` applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u32>("LLM_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("LLM_RETRY_BASE_DELAY_SECONDS") {
            cfg.base_delay_secs = v;
        }
        if let Some(v) = env_parse::<u64>("LLM_RETRY_MAX_DELAY_SECONDS") {
            cfg.max_delay_secs = v;
        }
        cfg
    }

    /// Exponential backoff for a zero-based attempt index, capped at the
    /// configured ceiling: `min(base × 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let secs = self
            .base_delay_secs
            .checked_mul(factor)
            .unwrap_or(u64::MAX)
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context editing (stale tool-response compaction)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEditConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Tool responses strictly above this token count are candidates.
    #[serde(default = "d_10000")]
    pub token_threshold: usize,
    /// Minimum age in turns before a response may be compacted.
    #[serde(default = "d_10u32")]
    pub turn_threshold: u32,
    /// Fraction of the raw content kept as a preview in the replacement
    /// payload (mid-history compaction uses a short preview).
    #[serde(default = "d_01")]
    pub preview_ratio: f64,
}

impl Default for ContextEditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold: 10_000,
            turn_threshold: 10,
            preview_ratio: 0.1,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context summarization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// When false, the summarizer never triggers on token pressure
    /// (callers may still invoke it explicitly).
    #[serde(default = "d_true")]
    pub token_threshold_mode: bool,
    /// Trigger fraction of the model's context window.
    #[serde(default = "d_08")]
    pub threshold_percent: f64,
    /// Number of most-recent messages kept verbatim after a rebuild.
    #[serde(default = "d_8")]
    pub keep_last: usize,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold_mode: true,
            threshold_percent: 0.8,
            keep_last: 8,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Large-output offloading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Tool outputs strictly above this token count are spilled to disk.
    #[serde(default = "d_20000")]
    pub token_threshold: usize,
    /// Workspace-relative directory that holds all spill files.
    #[serde(default = "d_folder")]
    pub folder_name: String,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold: 20_000,
            folder_name: "tool_output_folder".into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregate agent config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub context_edit: ContextEditConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
    #[serde(default)]
    pub offload: OffloadConfig,
    /// Maximum model↔tool rounds per user turn.
    #[serde(default = "d_25")]
    pub max_turns: u32,
    /// Agent-level default sampling temperature; model records override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Base URL substituted into generated OpenAPI specs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_api_base: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            context_edit: ContextEditConfig::default(),
            summarize: SummarizeConfig::default(),
            offload: OffloadConfig::default(),
            max_turns: 25,
            temperature: None,
            spec_api_base: None,
        }
    }
}

impl AgentConfig {
    /// Defaults with all documented env overrides applied
    /// (`LLM_MAX_RETRIES`, `LLM_RETRY_*`, `MAX_TURNS`,
    /// `OPENAPI_API_BASE`).
    pub fn from_env() -> Self {
        let mut cfg = Self {
            retry: RetryConfig::from_env(),
            ..Self::default()
        };
        if let Some(v) = env_parse::<u32>("MAX_TURNS") {
            cfg.max_turns = v;
        }
        if let Ok(base) = std::env::var("OPENAPI_API_BASE") {
            if !base.is_empty() {
                cfg.spec_api_base = Some(base);
            }
        }
        cfg
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_3() -> u32 {
    3
}
fn d_5() -> u32 {
    5
}
fn d_8() -> usize {
    8
}
fn d_10() -> u64 {
    10
}
fn d_10u32() -> u32 {
    10
}
fn d_25() -> u32 {
    25
}
fn d_300() -> u64 {
    300
}
fn d_10000() -> usize {
    10_000
}
fn d_20000() -> usize {
    20_000
}
fn d_01() -> f64 {
    0.1
}
fn d_08() -> f64 {
    0.8
}
fn d_folder() -> String {
    "tool_output_folder".into()
}

/// Parse an env var, warning (not failing) on malformed values.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring malformed env override");
            None
        }
    }
}
