use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;

/// A tool invocation parsed out of a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// The tool-execution surface the agent core consumes. Discovery and
/// registration live in an external subsystem; the core only needs the
/// catalog and an invoke primitive.
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Definitions of every tool currently available to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke `name` with `arguments`, returning the raw string output.
    async fn invoke(
        &self,
        cancel: &CancelToken,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<String>;
}
