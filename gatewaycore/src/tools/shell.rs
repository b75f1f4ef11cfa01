//! `shell`: runs a shell command. High-risk per spec §4.4's "High-risk semantic
//! tools" clause — requires operator confirmation when a collaborator is configured.

use async_trait::async_trait;

use super::{Tool, ToolCallContent, ToolError, ToolRisk};

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Runs a shell command and returns its combined stdout/stderr."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"}
            },
            "required": ["command"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::High
    }

    async fn call(&self, args: &serde_json::Map<String, serde_json::Value>) -> Result<ToolCallContent, ToolError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing command".to_string()))?;

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ToolCallContent { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_is_high_risk() {
        assert_eq!(ShellTool.risk(), ToolRisk::High);
    }

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let tool = ShellTool;
        let mut args = serde_json::Map::new();
        args.insert("command".to_string(), serde_json::json!("echo hi"));
        let result = tool.call(&args).await.unwrap();
        assert_eq!(result.text.trim(), "hi");
    }
}
