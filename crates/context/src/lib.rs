//! Context management: the two coordinated reducers that keep a
//! conversation inside the model's context window.
//!
//! The [`editor::ContextEditor`] compacts stale oversized tool responses
//! in place; the [`summarizer::ContextSummarizer`] rebuilds the whole
//! history around an LLM-produced digest once token pressure crosses the
//! configured fraction of the context window. Both preserve the
//! tool-call/tool-result pairing invariant, and both are non-fatal: on
//! any failure the original message list is returned unchanged.

pub mod editor;
pub mod summarizer;

pub use editor::ContextEditor;
pub use summarizer::{ContextSummarizer, SummarizeResult};
