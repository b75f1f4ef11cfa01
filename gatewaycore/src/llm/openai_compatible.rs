//! The one adapter kind the registry knows today: *openai-compatible* Chat
//! Completions, spoken over `reqwest` against a configurable base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace, warn};

use crate::message::{Role, RuntimeMessage};
use crate::request::{GenerateConfig, RunnerToolCall, ToolDefinition, TurnResult};

use super::{Delta, LlmAdapter, RequestContext, RunnerError};

/// Speaks the *openai-compatible* Chat Completions wire schema against `base_url`.
pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    headers: std::collections::HashMap<String, String>,
}

impl OpenAiCompatibleAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            headers: std::collections::HashMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    fn chat_completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    fn build_request(&self, req: &ChatCompletionRequest, ctx: &RequestContext) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .header("X-Request-Id", ctx.request_id.clone())
            .json(req);
        for (k, v) in self.headers.iter().chain(ctx.extra_headers.iter()) {
            builder = builder.header(k, v);
        }
        builder
    }

    fn to_wire_messages(messages: &[RuntimeMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                    Role::System => "system",
                }
                .to_string();

                let tool_calls = if m.metadata.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.metadata
                            .tool_calls
                            .iter()
                            .map(|tc| WireToolCall {
                                id: tc.id.clone(),
                                r#type: "function".to_string(),
                                function: WireFunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                WireMessage {
                    role,
                    content: Some(m.text()),
                    tool_calls,
                    tool_call_id: m.metadata.tool_call_id.clone(),
                    name: m.metadata.name.clone(),
                }
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolDefinition]) -> Option<Vec<WireTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function".to_string(),
                    function: WireFunctionDef {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
        )
    }

    fn build_chat_request(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        stream: bool,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: config.model.clone(),
            messages: Self::to_wire_messages(messages),
            tools: Self::to_wire_tools(tools),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream,
        }
    }

    fn wire_choice_to_turn_result(choice: WireChoice) -> Result<TurnResult, RunnerError> {
        let message = choice.message.ok_or_else(|| {
            RunnerError::ProviderInvalidReply("choice missing message".to_string())
        })?;
        let tool_calls = Self::parse_tool_calls(message.tool_calls.unwrap_or_default())?;
        Ok(TurnResult {
            text: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn parse_tool_calls(wire: Vec<WireToolCall>) -> Result<Vec<RunnerToolCall>, RunnerError> {
        wire.into_iter()
            .map(|tc| {
                let arguments: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(&tc.function.arguments).map_err(|e| {
                        RunnerError::ProviderInvalidToolArguments(format!(
                            "tool {}: {e}",
                            tc.function.name
                        ))
                    })?;
                Ok(RunnerToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmAdapter for OpenAiCompatibleAdapter {
    async fn generate_turn(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        ctx: &RequestContext,
    ) -> Result<TurnResult, RunnerError> {
        let body = self.build_chat_request(messages, tools, config, false);
        let timeout = std::time::Duration::from_secs(config.timeout_seconds.unwrap_or(60));

        debug!(request_id = %ctx.request_id, model = %config.model, "generate_turn");

        let response = self
            .build_request(&body, ctx)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RunnerError::ProviderInvalidReply(format!(
                "status {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RunnerError::ProviderInvalidReply(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RunnerError::ProviderInvalidReply("no choices in reply".to_string()))?;

        Self::wire_choice_to_turn_result(choice)
    }

    async fn generate_turn_stream(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        ctx: &RequestContext,
        on_delta: mpsc::Sender<Delta>,
    ) -> Result<TurnResult, RunnerError> {
        let body = self.build_chat_request(messages, tools, config, true);
        let timeout = std::time::Duration::from_secs(config.timeout_seconds.unwrap_or(60));

        let response = self
            .build_request(&body, ctx)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RunnerError::ProviderInvalidReply(format!(
                "status {status}: {text}"
            )));
        }

        let mut full_content = String::new();
        let mut tool_call_map: std::collections::BTreeMap<u32, (String, String, String)> =
            std::collections::BTreeMap::new();
        let mut buf = String::new();
        let mut byte_stream = response.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(classify_transport_error)?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buf.find("\n\n") {
                let event = buf[..pos].to_string();
                buf.drain(..pos + 2);
                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    let wire_chunk: WireStreamChunk = match serde_json::from_str(data) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(error = %e, "skipping unparsable upstream SSE chunk");
                            continue;
                        }
                    };
                    for choice in wire_chunk.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                full_content.push_str(&content);
                                let _ = on_delta.send(Delta { content }).await;
                            }
                        }
                        for tc in choice.delta.tool_calls.unwrap_or_default() {
                            let entry = tool_call_map.entry(tc.index).or_insert_with(|| {
                                (tc.id.clone().unwrap_or_default(), String::new(), String::new())
                            });
                            if let Some(id) = tc.id {
                                if !id.is_empty() {
                                    entry.0 = id;
                                }
                            }
                            if let Some(func) = tc.function {
                                if let Some(name) = func.name {
                                    entry.1.push_str(&name);
                                }
                                if let Some(args) = func.arguments {
                                    entry.2.push_str(&args);
                                }
                            }
                        }
                    }
                }
            }
        }

        let wire_tool_calls: Vec<WireToolCall> = tool_call_map
            .into_values()
            .map(|(id, name, arguments)| WireToolCall {
                id,
                r#type: "function".to_string(),
                function: WireFunctionCall { name, arguments },
            })
            .collect();
        let tool_calls = Self::parse_tool_calls(wire_tool_calls)?;

        trace!(request_id = %ctx.request_id, chars = full_content.len(), tool_calls = tool_calls.len(), "generate_turn_stream complete");

        Ok(TurnResult {
            text: full_content,
            tool_calls,
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> RunnerError {
    if err.is_timeout() {
        RunnerError::Timeout
    } else {
        RunnerError::Transport(err.to_string())
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: Option<WireResponseMessage>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
}

#[derive(Deserialize, Default)]
struct WireStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Deserialize)]
struct WireStreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<WireStreamFunctionCall>,
}

#[derive(Deserialize)]
struct WireStreamFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RuntimeMessage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_turn_parses_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello there", "tool_calls": null}}]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatibleAdapter::new(server.uri(), "test-key");
        let messages = vec![RuntimeMessage::user("hi")];
        let config = GenerateConfig {
            provider_id: "openai".into(),
            model: "gpt-4o-mini".into(),
            ..Default::default()
        };
        let ctx = RequestContext {
            request_id: "req-1".into(),
            ..Default::default()
        };

        let result = adapter.generate_turn(&messages, &[], &config, &ctx).await.unwrap();
        assert_eq!(result.text, "hello there");
        assert!(result.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn generate_turn_classifies_malformed_tool_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "echo", "arguments": "not json"}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatibleAdapter::new(server.uri(), "test-key");
        let messages = vec![RuntimeMessage::user("hi")];
        let config = GenerateConfig::default();
        let ctx = RequestContext::default();

        let err = adapter.generate_turn(&messages, &[], &config, &ctx).await.unwrap_err();
        assert!(err.is_recoverable_tool_error());
    }

    #[tokio::test]
    async fn generate_turn_stream_forwards_deltas_in_order() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiCompatibleAdapter::new(server.uri(), "test-key");
        let messages = vec![RuntimeMessage::user("hi")];
        let config = GenerateConfig::default();
        let ctx = RequestContext::default();
        let (tx, mut rx) = mpsc::channel(8);

        let result = adapter
            .generate_turn_stream(&messages, &[], &config, &ctx, tx)
            .await
            .unwrap();
        assert_eq!(result.text, "Hello");

        let mut received = Vec::new();
        while let Ok(delta) = rx.try_recv() {
            received.push(delta.content);
        }
        assert_eq!(received, vec!["Hel".to_string(), "lo".to_string()]);
    }
}
