//! The default demo runner used when a provider has no resolvable credentials.
//! Rather than call out to nothing, it drives the turn loop through the `echo`
//! tool: first turn issues an `echo` call on the user's own text, second turn
//! returns the tool's result as the final reply. Exercises the full
//! tool_call/tool_result loop without any network access.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{Role, RuntimeMessage};
use crate::request::{GenerateConfig, RunnerToolCall, ToolDefinition, TurnResult};

use super::{Delta, LlmAdapter, RequestContext, RunnerError};

pub struct DemoAdapter;

impl DemoAdapter {
    fn turn_for(messages: &[RuntimeMessage], tools: &[ToolDefinition]) -> TurnResult {
        let echo_available = tools.iter().any(|t| t.name == "echo");

        match messages.last() {
            Some(last) if last.role == Role::Tool => TurnResult {
                text: last.text(),
                tool_calls: vec![],
            },
            Some(last) if last.role == Role::User && echo_available => {
                let mut arguments = serde_json::Map::new();
                arguments.insert("text".to_string(), serde_json::Value::String(last.text()));
                TurnResult {
                    text: String::new(),
                    tool_calls: vec![RunnerToolCall {
                        id: "demo-echo".to_string(),
                        name: "echo".to_string(),
                        arguments,
                    }],
                }
            }
            Some(last) => TurnResult {
                text: format!("Echo: {}", last.text()),
                tool_calls: vec![],
            },
            None => TurnResult {
                text: "Echo: ".to_string(),
                tool_calls: vec![],
            },
        }
    }
}

#[async_trait]
impl LlmAdapter for DemoAdapter {
    async fn generate_turn(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        _config: &GenerateConfig,
        _ctx: &RequestContext,
    ) -> Result<TurnResult, RunnerError> {
        Ok(Self::turn_for(messages, tools))
    }

    async fn generate_turn_stream(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        ctx: &RequestContext,
        on_delta: mpsc::Sender<Delta>,
    ) -> Result<TurnResult, RunnerError> {
        let result = self.generate_turn(messages, tools, config, ctx).await?;
        if !result.text.is_empty() {
            let _ = on_delta.send(Delta { content: result.text.clone() }).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool_def() -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "echoes text".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn first_turn_issues_an_echo_tool_call() {
        let messages = vec![RuntimeMessage::user("hello smoke")];
        let result = DemoAdapter
            .generate_turn(&messages, &[echo_tool_def()], &GenerateConfig::default(), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "echo");
        assert_eq!(
            result.tool_calls[0].arguments.get("text").unwrap().as_str().unwrap(),
            "hello smoke"
        );
    }

    #[tokio::test]
    async fn second_turn_returns_the_tool_result_as_final_reply() {
        let messages = vec![
            RuntimeMessage::user("hello smoke"),
            RuntimeMessage::assistant_with_tool_calls("", vec![]),
            RuntimeMessage::tool("Echo: hello smoke", "demo-echo", "echo"),
        ];
        let result = DemoAdapter
            .generate_turn(&messages, &[echo_tool_def()], &GenerateConfig::default(), &RequestContext::default())
            .await
            .unwrap();
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.text, "Echo: hello smoke");
    }

    #[tokio::test]
    async fn falls_back_to_direct_echo_when_tool_unavailable() {
        let messages = vec![RuntimeMessage::user("hi")];
        let result = DemoAdapter
            .generate_turn(&messages, &[], &GenerateConfig::default(), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(result.text, "Echo: hi");
    }
}
