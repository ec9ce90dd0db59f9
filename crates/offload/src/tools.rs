//! The `search_large_output` virtual tool.
//!
//! One tool, three operations dispatched on the `operation` field:
//!
//! - `read`: a 1-based inclusive character range, clipped to EOF
//! - `search`: ripgrep scan with two context lines around each hit
//! - `query`: jq query for JSON spill files
//!
//! All filenames pass through the path sandbox; patterns and queries are
//! checked for NUL bytes and otherwise handed to the external matcher
//! verbatim.

use std::path::PathBuf;

use serde::Deserialize;

use ax_domain::{CancelToken, Error, Result, ToolDefinition, ToolRegistry};

use crate::sandbox;
use crate::subprocess::run_captured;

pub const TOOL_NAME: &str = "search_large_output";

/// Lines of context shown before and after each search hit.
const SEARCH_CONTEXT_LINES: u32 = 2;

fn d_50() -> usize {
    50
}

#[derive(Debug, Deserialize)]
struct Params {
    filename: String,
    operation: String,
    // read
    start: Option<usize>,
    end: Option<usize>,
    // search
    pattern: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default = "d_50")]
    max_results: usize,
    // query
    query: Option<String>,
    #[serde(default)]
    compact: bool,
    #[serde(default)]
    raw: bool,
}

pub struct OffloadTool {
    root: PathBuf,
    folder_name: String,
    session_id: String,
}

impl OffloadTool {
    pub fn new(
        root: impl Into<PathBuf>,
        folder_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            folder_name: folder_name.into(),
            session_id: session_id.into(),
        }
    }

    /// The JSON schema advertised to the model.
    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.into(),
            description: "Access a saved oversized tool output: read a character range, \
                          search it with a regex, or run a jq query against JSON files."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Path from the replacement payload (tool_output_folder/...) or a bare spill filename"
                    },
                    "operation": {
                        "type": "string",
                        "enum": ["read", "search", "query"]
                    },
                    "start": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "read: first character, 1-based inclusive"
                    },
                    "end": {
                        "type": "integer",
                        "description": "read: last character, inclusive; clipped to end of file"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "search: regex pattern"
                    },
                    "case_sensitive": { "type": "boolean", "default": false },
                    "max_results": { "type": "integer", "default": 50 },
                    "query": {
                        "type": "string",
                        "description": "query: jq expression"
                    },
                    "compact": { "type": "boolean", "default": false },
                    "raw": { "type": "boolean", "default": false }
                },
                "required": ["filename", "operation"]
            }),
        }
    }

    pub async fn run(&self, cancel: &CancelToken, arguments: &serde_json::Value) -> Result<String> {
        let params: Params = serde_json::from_value(arguments.clone())
            .map_err(|e| Error::InvalidArgument(format!("bad {TOOL_NAME} arguments: {e}")))?;

        let path = sandbox::resolve_spill_path(
            &self.root,
            &self.folder_name,
            &self.session_id,
            &params.filename,
        )?;

        match params.operation.as_str() {
            "read" => self.read_range(&path, &params),
            "search" => self.search(cancel, &path, &params).await,
            "query" => self.query(cancel, &path, &params).await,
            other => Err(Error::InvalidArgument(format!(
                "unknown operation '{other}' (expected read, search or query)"
            ))),
        }
    }

    // ── read ───────────────────────────────────────────────────────

    fn read_range(&self, path: &std::path::Path, params: &Params) -> Result<String> {
        let start = params
            .start
            .ok_or_else(|| Error::InvalidArgument("read requires 'start'".into()))?;
        let end = params
            .end
            .ok_or_else(|| Error::InvalidArgument("read requires 'end'".into()))?;
        if start < 1 {
            return Err(Error::InvalidArgument("'start' is 1-based".into()));
        }
        if end < start {
            return Err(Error::InvalidArgument(format!(
                "'end' ({end}) must be >= 'start' ({start})"
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let len = content.chars().count();
        if start > len {
            return Err(Error::InvalidArgument(format!(
                "'start' ({start}) is beyond end of file ({len} characters)"
            )));
        }

        // 1-based inclusive, end clipped to EOF.
        Ok(content
            .chars()
            .skip(start - 1)
            .take(end.min(len) - start + 1)
            .collect())
    }

    // ── search ─────────────────────────────────────────────────────

    async fn search(
        &self,
        cancel: &CancelToken,
        path: &std::path::Path,
        params: &Params,
    ) -> Result<String> {
        let pattern = params
            .pattern
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("search requires 'pattern'".into()))?;
        sandbox::validate_no_nul(pattern, "pattern")?;

        let mut args: Vec<String> = vec![
            "--no-heading".into(),
            "--line-number".into(),
            "--context".into(),
            SEARCH_CONTEXT_LINES.to_string(),
            "--max-count".into(),
            params.max_results.max(1).to_string(),
        ];
        if !params.case_sensitive {
            args.push("--ignore-case".into());
        }
        args.push("--".into());
        args.push(pattern.to_owned());
        args.push(path.to_string_lossy().into_owned());

        let out = run_captured(cancel, "rg", &args).await?;
        match out.exit_code {
            Some(0) => Ok(out.stdout),
            // rg exits 1 on a clean no-match run; that is an answer, not
            // an error.
            Some(1) => Ok(format!("No matches found for pattern '{pattern}'")),
            _ => Err(Error::Tool {
                tool: "rg".into(),
                message: out.stderr.trim().to_owned(),
            }),
        }
    }

    // ── query ──────────────────────────────────────────────────────

    async fn query(
        &self,
        cancel: &CancelToken,
        path: &std::path::Path,
        params: &Params,
    ) -> Result<String> {
        let query = params
            .query
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("query requires 'query'".into()))?;
        sandbox::validate_no_nul(query, "query")?;

        let mut args: Vec<String> = Vec::new();
        if params.compact {
            args.push("--compact-output".into());
        }
        if params.raw {
            args.push("--raw-output".into());
        }
        args.push(query.to_owned());
        args.push(path.to_string_lossy().into_owned());

        let out = run_captured(cancel, "jq", &args).await?;
        match out.exit_code {
            Some(0) => Ok(out.stdout),
            _ => Err(Error::Tool {
                tool: "jq".into(),
                message: out.stderr.trim().to_owned(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ToolRegistry for OffloadTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![Self::definition()]
    }

    async fn invoke(
        &self,
        cancel: &CancelToken,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<String> {
        if name != TOOL_NAME {
            return Err(Error::Tool {
                tool: name.to_owned(),
                message: "not an offload virtual tool".into(),
            });
        }
        self.run(cancel, arguments).await
    }
}
