//! `console` channel: writes to the process log, gated by `enabled` and
//! prefixed with the configured `bot_prefix` (spec §6).

use async_trait::async_trait;
use tracing::info;

use super::{Channel, ChannelError};

#[derive(Default)]
pub struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_text(
        &self,
        _target: &serde_json::Value,
        config: &serde_json::Map<String, serde_json::Value>,
        text: &str,
    ) -> Result<(), ChannelError> {
        let enabled = config.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);
        if !enabled {
            return Err(ChannelError::Misconfigured("console channel disabled".to_string()));
        }
        let prefix = config.get("bot_prefix").and_then(|v| v.as_str()).unwrap_or("");
        info!(target: "gateway_core::channels::console", "{prefix}{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_console_channel_rejects_send() {
        let channel = ConsoleChannel::default();
        let mut config = serde_json::Map::new();
        config.insert("enabled".to_string(), serde_json::json!(false));
        let err = channel
            .send_text(&serde_json::Value::Null, &config, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn enabled_console_channel_accepts_send() {
        let channel = ConsoleChannel::default();
        let config = serde_json::Map::new();
        channel
            .send_text(&serde_json::Value::Null, &config, "hi")
            .await
            .unwrap();
    }
}
