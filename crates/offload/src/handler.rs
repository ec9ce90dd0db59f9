//! Spill-to-disk of oversized tool outputs.
//!
//! The handler decides when an output is too large to stay inline
//! (strictly above the configured token threshold), persists the *raw*
//! payload — wrappers stripped — under the session's spill folder, and
//! renders the replacement payload that takes the output's place in the
//! conversation. Spill files are write-once; only session GC (outside
//! this crate) ever deletes them.

use std::path::{Path, PathBuf};

use chrono::Utc;

use ax_domain::config::OffloadConfig;
use ax_domain::{Result, TokenCounter};

use crate::tools;

/// Characters whose presence in a tool name would break the spill
/// filename; each is replaced with `_`.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum length of the sanitized tool name inside a filename.
const MAX_TOOL_NAME_LEN: usize = 50;

/// Which replacement payload to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStyle {
    /// A fresh spill right after tool execution: long preview
    /// (`threshold / 2` characters) and the full virtual-tool usage guide.
    Fresh,
    /// Mid-history compaction by the context editor: short preview
    /// (a fraction of the content) and a one-line footer.
    Historical,
}

/// A persisted spill file.
#[derive(Debug, Clone)]
pub struct SpillFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Workspace-relative path with forward slashes, as shown to the model.
    pub relative_path: String,
    pub is_json: bool,
}

pub struct OffloadHandler {
    config: OffloadConfig,
    /// Absolute location of the spill folder (`<workspace>/tool_output_folder`).
    root: PathBuf,
    session_id: String,
    counter: TokenCounter,
}

impl OffloadHandler {
    pub fn new(
        config: OffloadConfig,
        root: impl Into<PathBuf>,
        session_id: impl Into<String>,
        counter: TokenCounter,
    ) -> Self {
        Self {
            config,
            root: root.into(),
            session_id: session_id.into(),
            counter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_name(&self) -> &str {
        &self.config.folder_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The per-session spill directory, for external GC.
    pub fn session_dir(&self) -> PathBuf {
        self.root.join(&self.session_id)
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Spill decision: enabled and strictly above the token threshold.
    pub fn is_large(&self, content: &str) -> bool {
        self.config.enabled && self.counter.count(content) > self.config.token_threshold
    }

    /// Like [`is_large`] but against a caller-supplied threshold. The
    /// context editor reuses the handler with its own, lower threshold.
    pub fn is_large_for(&self, content: &str, threshold: usize) -> bool {
        self.config.enabled && self.counter.count(content) > threshold
    }

    /// Spill `content` if it is oversized. Returns the replacement payload
    /// to put in the conversation, or `None` when the content stays inline.
    pub fn offload(
        &self,
        tool_name: &str,
        content: &str,
        style: PreviewStyle,
    ) -> Result<Option<String>> {
        if !self.is_large(content) {
            return Ok(None);
        }
        let raw = extract_actual_content(content);
        let spill = self.write(tool_name, &raw)?;
        Ok(Some(self.replacement_payload(tool_name, &spill, &raw, style)))
    }

    /// Persist `raw` under the session folder. The extension is `.json`
    /// iff the content parses as JSON, `.txt` otherwise.
    pub fn write(&self, tool_name: &str, raw: &str) -> Result<SpillFile> {
        let dir = self.session_dir();
        std::fs::create_dir_all(&dir)?;

        let is_json = content_is_json(raw);
        let ext = if is_json { "json" } else { "txt" };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let stem = format!("tool_{stamp}_{}", sanitize_tool_name(tool_name));

        // Same tool spilling twice within a second gets a suffix.
        let mut path = dir.join(format!("{stem}.{ext}"));
        let mut seq = 1u32;
        while path.exists() {
            seq += 1;
            path = dir.join(format!("{stem}_{seq}.{ext}"));
        }

        std::fs::write(&path, raw)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_path = format!(
            "{}/{}/{}",
            self.config.folder_name, self.session_id, file_name
        );

        tracing::debug!(
            path = %path.display(),
            bytes = raw.len(),
            "spilled oversized tool output"
        );

        Ok(SpillFile {
            path,
            relative_path,
            is_json,
        })
    }

    /// Render the payload that replaces the oversized output in history.
    pub fn replacement_payload(
        &self,
        tool_name: &str,
        spill: &SpillFile,
        raw: &str,
        style: PreviewStyle,
    ) -> String {
        let preview_chars = match style {
            PreviewStyle::Fresh => self.config.token_threshold / 2,
            PreviewStyle::Historical => raw.chars().count() / 10,
        };
        let preview: String = raw.chars().take(preview_chars).collect();
        let rel = &spill.relative_path;

        match style {
            PreviewStyle::Fresh => {
                let tokens = self.counter.count(raw);
                format!(
                    "TOOL RESULT TOO LARGE: The output of tool '{tool_name}' \
                     ({tokens} tokens) has been saved to: {rel}\n\n\
                     Preview (first {preview_chars} characters):\n{preview}\n\n\
                     Use the {tool} tool to access the full content:\n\
                     - read:   {{\"filename\": \"{rel}\", \"operation\": \"read\", \"start\": 1, \"end\": 2000}}\n\
                     - search: {{\"filename\": \"{rel}\", \"operation\": \"search\", \"pattern\": \"error\"}}\n\
                     - query:  {{\"filename\": \"{rel}\", \"operation\": \"query\", \"query\": \".items | length\"}}",
                    tool = tools::TOOL_NAME,
                )
            }
            PreviewStyle::Historical => format!(
                "[Stale tool output compacted] The output of tool '{tool_name}' \
                 has been saved to: {rel}\n\n\
                 Preview:\n{preview}\n\n\
                 Retrieve details with {tool} (operations: read, search, query).",
                tool = tools::TOOL_NAME,
            ),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strip known transport wrappers so the persisted file holds the raw
/// payload the model actually cares about.
///
/// Two wrappers are recognized:
/// - `TOOL RESULT for <tool>:` prefix lines
/// - MCP text envelopes, `{"type":"text","text":"…"}` (JSON unescaping
///   happens as a side effect of parsing)
pub fn extract_actual_content(content: &str) -> String {
    let trimmed = content.trim_start();

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if value.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                    return text.to_owned();
                }
            }
        }
    }

    if let Some(rest) = trimmed.strip_prefix("TOOL RESULT for ") {
        if let Some(colon) = rest.find(':') {
            let body = &rest[colon + 1..];
            // One separator (newline or space) belongs to the wrapper.
            let body = body
                .strip_prefix('\n')
                .or_else(|| body.strip_prefix(' '))
                .unwrap_or(body);
            return body.to_owned();
        }
    }

    content.to_owned()
}

/// Replace filesystem-hostile characters and cap the length.
pub fn sanitize_tool_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if FORBIDDEN_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    cleaned.chars().take(MAX_TOOL_NAME_LEN).collect()
}

fn content_is_json(raw: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw).is_ok()
}
