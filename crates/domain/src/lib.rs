//! Shared domain types for the Axon agent core.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! messages, model records, usage metrics, stream chunks, lifecycle
//! events, configuration, and the cancel token threaded through every
//! I/O call.

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod model;
pub mod stream;
pub mod tokens;
pub mod tool;

pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, Result};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use model::{Choice, GenerationResponse, LlmConfig, ModelMetadata, ModelRecord, UsageMetrics};
pub use stream::{ChunkSender, StreamChunk};
pub use tokens::TokenCounter;
pub use tool::{ToolCall, ToolDefinition, ToolRegistry};
