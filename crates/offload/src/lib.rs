//! Large-output offloading.
//!
//! Oversized tool results are spilled to sandboxed files and replaced in
//! the conversation with a reference payload carrying a preview. The
//! model re-fetches detail on demand through the `search_large_output`
//! virtual tool (`read` / `search` / `query` operations).

pub mod handler;
pub mod sandbox;
pub mod subprocess;
pub mod tools;

pub use handler::{extract_actual_content, OffloadHandler, PreviewStyle, SpillFile};
pub use tools::OffloadTool;
