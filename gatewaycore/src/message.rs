//! Runtime message types shared by the store, the runner, and the orchestrator.
//!
//! A [`RuntimeMessage`] is the gateway's internal representation of one turn in a
//! conversation. Providers see a different wire schema (see [`crate::llm`]); the
//! adapter translates between the two, preserving tool-call metadata.

use serde::{Deserialize, Serialize};

/// Who produced a [`RuntimeMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// One content part of a message. Only `text` exists today; the type is an enum
/// so richer parts (images, files) can be added without breaking callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text { text: s.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Part::Text { text } => text,
        }
    }
}

/// Metadata carried on assistant/tool messages so the next turn can react to tool calls.
///
/// Assistant messages that requested tool calls carry `tool_calls`; tool messages
/// carry `tool_call_id`/`name` linking the result back to its call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A single tool call as recorded in assistant message metadata: `id`, `name`, and
/// the raw, unparsed JSON arguments string (preserved verbatim for feedback on
/// parse failure, see [`crate::llm::RunnerError::InvalidToolArguments`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallMeta {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One message in a conversation transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeMessage {
    pub role: Role,
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "is_default_metadata")]
    pub metadata: MessageMetadata,
}

fn is_default_metadata(m: &MessageMetadata) -> bool {
    m.tool_calls.is_empty() && m.tool_call_id.is_none() && m.name.is_none()
}

impl RuntimeMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![Part::text(text)],
            metadata: MessageMetadata::default(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![Part::text(text)],
            metadata: MessageMetadata::default(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![Part::text(text)],
            metadata: MessageMetadata::default(),
        }
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallMeta>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![Part::text(text)],
            metadata: MessageMetadata {
                tool_calls,
                ..Default::default()
            },
        }
    }

    pub fn tool(text: impl Into<String>, tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![Part::text(text)],
            metadata: MessageMetadata {
                tool_call_id: Some(tool_call_id.into()),
                name: Some(name.into()),
                ..Default::default()
            },
        }
    }

    /// Concatenates all text parts; most messages carry exactly one.
    pub fn text(&self) -> String {
        self.content.iter().map(Part::as_text).collect::<Vec<_>>().join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_text_roundtrip() {
        let m = RuntimeMessage::user("hello");
        assert_eq!(m.text(), "hello");
        assert_eq!(m.role, Role::User);
    }

    #[test]
    fn default_metadata_is_skipped_in_json() {
        let m = RuntimeMessage::user("hi");
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn tool_call_metadata_serializes() {
        let m = RuntimeMessage::assistant_with_tool_calls(
            "",
            vec![ToolCallMeta {
                id: "c1".into(),
                name: "echo".into(),
                arguments: "{}".into(),
            }],
        );
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"tool_calls\""));
        assert!(json.contains("\"echo\""));
    }
}
