//! Channel dispatch (spec §6): console/webhook/qq implementations of a common
//! `send_text` capability, used by the cron scheduler's job body and by the
//! QQ inbound webhook handler.

mod console;
mod qq;
mod webhook;

pub use console::ConsoleChannel;
pub use qq::QqChannel;
pub use webhook::WebhookChannel;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel not supported: {0}")]
    NotSupported(String),
    #[error("channel send failed: {0}")]
    SendFailed(String),
    #[error("channel misconfigured: {0}")]
    Misconfigured(String),
}

impl ChannelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChannelError::NotSupported(_) => ErrorCode::ChannelNotSupported,
            ChannelError::SendFailed(_) => ErrorCode::AgentServiceUnavailable,
            ChannelError::Misconfigured(_) => ErrorCode::InvalidProviderConfig,
        }
    }
}

/// A transport capable of delivering generated text to an external surface.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Sends `text` to `target` (channel-specific, e.g. a QQ group id or a
    /// webhook URL override), using the given recognized-key `config`.
    async fn send_text(
        &self,
        target: &serde_json::Value,
        config: &serde_json::Map<String, serde_json::Value>,
        text: &str,
    ) -> Result<(), ChannelError>;
}

/// Resolves a channel name to its implementation. Unknown names map to
/// `channel_not_supported`.
pub fn resolve(name: &str) -> Result<Box<dyn Channel>, ChannelError> {
    match name {
        "console" => Ok(Box::new(ConsoleChannel::default())),
        "webhook" => Ok(Box::new(WebhookChannel::default())),
        "qq" => Ok(Box::new(QqChannel::default())),
        other => Err(ChannelError::NotSupported(other.to_string())),
    }
}
