use serde::{Deserialize, Serialize};

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    /// A tool invocation requested by the model. `arguments` is the raw
    /// JSON text exactly as the provider emitted it.
    #[serde(rename = "tool_call")]
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The result of a tool invocation. Every result in a well-formed
    /// history has a prior `ToolCall` with the same `call_id` in an
    /// assistant message.
    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::ToolCall {
                call_id: call_id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }]),
        }
    }
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
                content: content.into(),
            }]),
        }
    }

    /// The `(call_id, tool_name, content)` triple when this message is a
    /// single tool result, `None` otherwise.
    pub fn as_tool_result(&self) -> Option<(&str, &str, &str)> {
        if self.role != Role::Tool {
            return None;
        }
        match &self.content {
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::ToolResult {
                    call_id,
                    tool_name,
                    content,
                } => Some((call_id.as_str(), tool_name.as_str(), content.as_str())),
                _ => None,
            }),
            MessageContent::Text(_) => None,
        }
    }

    /// Mutable access to the content of the first tool-result part.
    /// Used for in-place compaction; `call_id` and `tool_name` are
    /// deliberately not reachable through this accessor.
    pub fn tool_result_content_mut(&mut self) -> Option<&mut String> {
        match &mut self.content {
            MessageContent::Parts(parts) => parts.iter_mut().find_map(|p| match p {
                ContentPart::ToolResult { content, .. } => Some(content),
                _ => None,
            }),
            MessageContent::Text(_) => None,
        }
    }

    /// IDs of all tool calls carried by this message.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolCall { call_id, .. } => Some(call_id.as_str()),
                    _ => None,
                })
                .collect(),
            MessageContent::Text(_) => Vec::new(),
        }
    }

    /// True when this is an assistant message carrying at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_call_ids().is_empty()
    }
}

impl MessageContent {
    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text`, returns the string directly. For `Parts`, joins all
    /// `Text` parts with `"\n"`; tool calls and results are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Index of the assistant message that owns `call_id`, scanning backwards
/// from `before` (exclusive).
///
/// The call/result relationship is a cross-reference by id over a flat
/// ordered sequence, so a reverse scan finds the nearest owner.
pub fn find_tool_call_owner(messages: &[Message], call_id: &str, before: usize) -> Option<usize> {
    let upper = before.min(messages.len());
    messages[..upper]
        .iter()
        .rposition(|m| m.role == Role::Assistant && m.tool_call_ids().contains(&call_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_accessors() {
        let msg = Message::tool_result("c1", "search", "hits");
        let (id, name, content) = msg.as_tool_result().unwrap();
        assert_eq!(id, "c1");
        assert_eq!(name, "search");
        assert_eq!(content, "hits");
    }

    #[test]
    fn tool_result_content_mut_preserves_ids() {
        let mut msg = Message::tool_result("c1", "search", "big output");
        *msg.tool_result_content_mut().unwrap() = "compacted".into();
        let (id, name, content) = msg.as_tool_result().unwrap();
        assert_eq!(id, "c1");
        assert_eq!(name, "search");
        assert_eq!(content, "compacted");
    }

    #[test]
    fn plain_messages_are_not_tool_results() {
        assert!(Message::user("hi").as_tool_result().is_none());
        assert!(Message::assistant("ok").as_tool_result().is_none());
    }

    #[test]
    fn tool_call_ids_on_assistant() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "using tools".into() },
                ContentPart::ToolCall {
                    call_id: "a".into(),
                    name: "exec".into(),
                    arguments: "{}".into(),
                },
                ContentPart::ToolCall {
                    call_id: "b".into(),
                    name: "read".into(),
                    arguments: "{}".into(),
                },
            ]),
        };
        assert_eq!(msg.tool_call_ids(), vec!["a", "b"]);
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn find_owner_scans_backwards() {
        let messages = vec![
            Message::user("q"),
            Message::tool_call("c1", "exec", "{}"),
            Message::tool_result("c1", "exec", "out"),
            Message::assistant("done"),
        ];
        assert_eq!(find_tool_call_owner(&messages, "c1", 2), Some(1));
        assert_eq!(find_tool_call_owner(&messages, "c1", 1), None);
        assert_eq!(find_tool_call_owner(&messages, "missing", 4), None);
    }

    #[test]
    fn extract_all_text_joins_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "one".into() },
            ContentPart::ToolCall {
                call_id: "c".into(),
                name: "t".into(),
                arguments: "{}".into(),
            },
            ContentPart::Text { text: "two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "one\ntwo");
    }
}
