//! Request/response types shared across the LLM Runner, Agent Orchestrator, and
//! Cron Scheduler (spec §4.3–§4.5).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An explicit tool directive that bypasses the runner entirely (spec §4.4 step 2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// One request to run an agent turn: the HTTP handler and the cron job body both
/// build one of these before calling the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProcessRequest {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub text: String,
    #[serde(default)]
    pub tool: Option<RequestedToolCall>,
    #[serde(default)]
    pub generate: GenerateConfig,
    /// Opaque caller-supplied business metadata (spec §4.3), forwarded to the
    /// provider call via [`crate::llm::RequestContext::biz_params`] but otherwise
    /// untouched by the orchestrator.
    #[serde(default)]
    pub biz_params: Option<serde_json::Value>,
}

/// Per-turn generation parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// One tool advertised to the provider for this turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One tool call as returned by the runner: `arguments` is already parsed into a map,
/// unlike [`crate::message::ToolCallMeta::arguments`] which keeps the raw JSON string
/// for history round-tripping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The outcome of one provider call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnResult {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<RunnerToolCall>,
}

/// Extra per-provider headers, merged over the provider's configured headers.
pub type HeaderMap = HashMap<String, String>;
