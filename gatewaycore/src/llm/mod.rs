//! LLM Runner (spec §4.3): one provider call = one turn.
//!
//! The adapter trait mirrors the teacher's `LlmClient` (`invoke`/`invoke_stream`)
//! shape, generalized from a single hardcoded client to an explicit `provider_id` +
//! [`GenerateConfig`] parameterization so one runner can drive many configured
//! provider entries against the same *openai-compatible* wire schema.

mod demo;
mod openai_compatible;

pub use demo::DemoAdapter;
pub use openai_compatible::OpenAiCompatibleAdapter;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorCode;
use crate::message::RuntimeMessage;
use crate::request::{GenerateConfig, ToolDefinition, TurnResult};

/// One incremental piece of assistant text, passed through verbatim — never re-chunked.
#[derive(Clone, Debug)]
pub struct Delta {
    pub content: String,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("provider returned a malformed or incomplete reply: {0}")]
    ProviderInvalidReply(String),
    #[error("tool call arguments could not be parsed: {0}")]
    ProviderInvalidToolArguments(String),
    #[error("provider call timed out")]
    Timeout,
    #[error("request canceled")]
    ContextCanceled,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RunnerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RunnerError::ProviderInvalidReply(_) => ErrorCode::ProviderInvalidReply,
            RunnerError::ProviderInvalidToolArguments(_) => ErrorCode::InvalidToolArguments,
            RunnerError::Timeout => ErrorCode::ModelTimeout,
            RunnerError::ContextCanceled => ErrorCode::RunnerError,
            RunnerError::Transport(_) => ErrorCode::RunnerError,
        }
    }

    /// Whether the orchestrator may recover from this error by feeding the model
    /// a tool-error message and continuing the loop (spec §4.4 step 3b).
    pub fn is_recoverable_tool_error(&self) -> bool {
        matches!(self, RunnerError::ProviderInvalidToolArguments(_))
    }
}

/// An `X-Request-Id`, any caller-supplied headers, and opaque caller business
/// parameters (spec §4.3 contract input `biz_params`) to attach to the provider call.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub extra_headers: std::collections::HashMap<String, String>,
    pub biz_params: Option<serde_json::Value>,
}

/// One provider call = one turn. Implementations translate [`RuntimeMessage`]s into
/// their wire schema, preserving tool-call metadata, and classify failures per
/// [`RunnerError`].
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Blocking turn: returns once the full reply (and any tool calls) are available.
    async fn generate_turn(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        ctx: &RequestContext,
    ) -> Result<TurnResult, RunnerError>;

    /// Streaming turn: `on_delta` is invoked for every upstream token/delta as it
    /// arrives, in order, before the call resolves to the final [`TurnResult`].
    async fn generate_turn_stream(
        &self,
        messages: &[RuntimeMessage],
        tools: &[ToolDefinition],
        config: &GenerateConfig,
        ctx: &RequestContext,
        on_delta: mpsc::Sender<Delta>,
    ) -> Result<TurnResult, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_tool_arguments_is_recoverable() {
        let err = RunnerError::ProviderInvalidToolArguments("bad json".into());
        assert!(err.is_recoverable_tool_error());
        assert_eq!(err.code(), ErrorCode::InvalidToolArguments);
    }

    #[test]
    fn timeout_is_not_recoverable() {
        let err = RunnerError::Timeout;
        assert!(!err.is_recoverable_tool_error());
        assert_eq!(err.code(), ErrorCode::ModelTimeout);
    }
}
