//! `time.now`: returns the current UTC timestamp. Low-risk; demonstrates the
//! non-streamed synthesized-delta chunking path through the orchestrator.

use async_trait::async_trait;
use chrono::Utc;

use super::{Tool, ToolCallContent, ToolError};

pub struct TimeNowTool;

#[async_trait]
impl Tool for TimeNowTool {
    fn name(&self) -> &str {
        "time.now"
    }

    fn description(&self) -> &str {
        "Returns the current UTC timestamp in ISO-8601."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn call(&self, _args: &serde_json::Map<String, serde_json::Value>) -> Result<ToolCallContent, ToolError> {
        Ok(ToolCallContent {
            text: Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_parseable_rfc3339_timestamp() {
        let tool = TimeNowTool;
        let result = tool.call(&serde_json::Map::new()).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&result.text).is_ok());
    }
}
