//! The typed event stream the Agent Orchestrator emits (spec §4.4). Order and
//! shape are part of the contract clients depend on.

use serde::Serialize;

use crate::error::ErrorCode;

#[derive(Clone, Debug, Serialize)]
pub struct ToolCallPayload {
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolResultPayload {
    pub name: String,
    pub ok: bool,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorMeta {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted { step: u32 },
    AssistantDelta { step: u32, delta: String },
    ToolCall { step: u32, tool_call: ToolCallPayload },
    ToolResult { step: u32, tool_result: ToolResultPayload },
    Completed { step: u32, reply: String },
    Error { meta: ErrorMeta },
}

impl AgentEvent {
    pub fn to_sse_line(&self) -> String {
        let json = serde_json::to_string(self).expect("event serialization is infallible");
        format!("data: {json}\n\n")
    }

    pub const DONE_LINE: &'static str = "data: [DONE]\n\n";
}

/// Truncates `text` to at most 160 runes, appending an ellipsis when truncated
/// (spec §4.4 `tool_result.summary`).
pub fn truncate_summary(text: &str) -> String {
    truncate_runes(text, 160)
}

fn truncate_runes(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let mut truncated: String = chars[..max].iter().collect();
    truncated.push('…');
    truncated
}

/// Splits `text` into chunks of `rune_len` runes, in order — used both to
/// synthesize `assistant_delta`s for non-streamed turns and for the explicit
/// tool-directive short-circuit (spec §4.4 steps 2 and 3c).
pub fn chunk_text(text: &str, rune_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(rune_len.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_summary_leaves_short_text_untouched() {
        assert_eq!(truncate_summary("short"), "short");
    }

    #[test]
    fn truncate_summary_appends_ellipsis_past_160_runes() {
        let long = "x".repeat(200);
        let truncated = truncate_summary(&long);
        assert_eq!(truncated.chars().count(), 161);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn chunk_text_splits_into_fixed_size_runes() {
        let chunks = chunk_text("hello world", 4);
        assert_eq!(chunks, vec!["hell", "o wo", "rld"]);
    }

    #[test]
    fn chunk_text_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 12).is_empty());
    }
}
