//! `echo`: echoes input text back. Grounds the default demo scenario
//! (`Echo: <text>`).

use async_trait::async_trait;

use super::{Tool, ToolCallContent, ToolError};

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes the given text back, prefixed with 'Echo: '."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"}
            },
            "required": ["text"]
        })
    }

    async fn call(&self, args: &serde_json::Map<String, serde_json::Value>) -> Result<ToolCallContent, ToolError> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing text".to_string()))?;
        Ok(ToolCallContent {
            text: format!("Echo: {text}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_prefixed_text() {
        let tool = EchoTool;
        let mut args = serde_json::Map::new();
        args.insert("text".to_string(), serde_json::json!("hello"));
        let result = tool.call(&args).await.unwrap();
        assert_eq!(result.text, "Echo: hello");
    }
}
