//! Tool runtime (spec §4.4 "Tool runtime policies"): a static registry, a
//! `disabled_tools` deny-list, schema validation, and an optional confirmation
//! collaborator for high-risk tools.
//!
//! Grounded on the teacher's `tools::Tool` trait shape (name/spec/call), adapted
//! to this crate's [`crate::request::ToolDefinition`]/[`RunnerToolCall`] types.

mod echo;
mod shell;
mod time_now;

pub use echo::EchoTool;
pub use shell::ShellTool;
pub use time_now::TimeNowTool;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ErrorCode;
use crate::request::ToolDefinition;

/// The text result of a successful tool call.
#[derive(Clone, Debug)]
pub struct ToolCallContent {
    pub text: String,
}

/// Risk tier for a tool. High-risk tools go through an optional confirmation
/// collaborator before they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolRisk {
    Low,
    High,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool arguments invalid: {0}")]
    InvalidArguments(String),
    #[error("tool disabled: {0}")]
    Disabled(String),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error("tool execution timed out")]
    Timeout,
    #[error("risk confirmation timed out")]
    ConfirmationTimeout,
    #[error("risk action rejected")]
    ConfirmationRejected,
}

impl ToolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::InvalidArguments(_) => ErrorCode::InvalidToolArguments,
            ToolError::Disabled(_) => ErrorCode::ToolDisabled,
            ToolError::Execution(_) => ErrorCode::ToolError,
            ToolError::Timeout => ErrorCode::ToolTimeout,
            ToolError::ConfirmationTimeout => ErrorCode::RiskConfirmationTimeout,
            ToolError::ConfirmationRejected => ErrorCode::RiskActionRejected,
        }
    }
}

/// One tool that can be called during an agent turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    fn risk(&self) -> ToolRisk {
        ToolRisk::Low
    }
    async fn call(&self, args: &serde_json::Map<String, serde_json::Value>) -> Result<ToolCallContent, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Asks an operator whether a high-risk tool call may proceed. A configured
/// timeout (or a rejection) surfaces as [`ToolError::ConfirmationTimeout`] /
/// [`ToolError::ConfirmationRejected`].
#[async_trait]
pub trait ConfirmationCollaborator: Send + Sync {
    async fn confirm(&self, tool_name: &str, args: &serde_json::Value) -> Result<bool, ToolError>;
}

/// Static tool registry with a `disabled_tools` deny-list.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    disabled: HashSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            disabled: HashSet::new(),
        }
    }

    /// Builds the registry with the gateway's built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TimeNowTool));
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(ShellTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn disable(&mut self, names: impl IntoIterator<Item = String>) {
        self.disabled.extend(names);
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    /// Tool definitions advertised to the runner — excludes disabled tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| !self.disabled.contains(t.name()))
            .map(|t| t.definition())
            .collect()
    }

    /// Validates `args` against the tool's schema, then executes it, honoring the
    /// deny-list and (for high-risk tools) an optional confirmation collaborator.
    pub async fn call(
        &self,
        name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        confirmation: Option<&dyn ConfirmationCollaborator>,
    ) -> Result<ToolCallContent, ToolError> {
        if self.disabled.contains(name) {
            return Err(ToolError::Disabled(name.to_string()));
        }
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Execution(format!("unknown tool: {name}")))?;

        validate_schema(&tool.input_schema(), args)?;

        if tool.risk() == ToolRisk::High {
            if let Some(collaborator) = confirmation {
                let value = serde_json::Value::Object(args.clone());
                let approved = collaborator.confirm(name, &value).await?;
                if !approved {
                    return Err(ToolError::ConfirmationRejected);
                }
            }
        }

        tool.call(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn validate_schema(
    schema: &serde_json::Value,
    args: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ToolError::Execution(format!("invalid schema: {e}")))?;
    let value = serde_json::Value::Object(args.clone());
    let issues: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
    if !issues.is_empty() {
        return Err(ToolError::InvalidArguments(issues.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_tool_is_rejected() {
        let mut registry = ToolRegistry::with_builtins();
        registry.disable(["echo".to_string()]);
        let args = serde_json::Map::new();
        let err = registry.call("echo", &args, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToolDisabled);
    }

    #[tokio::test]
    async fn definitions_excludes_disabled_tools() {
        let mut registry = ToolRegistry::with_builtins();
        registry.disable(["shell".to_string()]);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert!(!names.contains(&"shell".to_string()));
        assert!(names.contains(&"echo".to_string()));
    }

    #[tokio::test]
    async fn schema_validation_rejects_missing_required_field() {
        let registry = ToolRegistry::with_builtins();
        let args = serde_json::Map::new();
        let err = registry.call("echo", &args, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToolArguments);
    }

    struct AlwaysReject;
    #[async_trait]
    impl ConfirmationCollaborator for AlwaysReject {
        async fn confirm(&self, _tool_name: &str, _args: &serde_json::Value) -> Result<bool, ToolError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn high_risk_tool_honors_confirmation_rejection() {
        let registry = ToolRegistry::with_builtins();
        let mut args = serde_json::Map::new();
        args.insert("command".to_string(), serde_json::json!("echo hi"));
        let collaborator = AlwaysReject;
        let err = registry
            .call("shell", &args, Some(&collaborator))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RiskActionRejected);
    }
}
