//! Shared error taxonomy (spec §7). Library code returns typed errors with a
//! [`ErrorCode`] attached; HTTP status mapping happens only in `gatewayserve`.

use serde::Serialize;
use std::fmt;

/// One of the stable string codes from the error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidChat,
    InvalidJson,
    InvalidEnvValue,
    InvalidModelSlot,
    InvalidProviderId,
    InvalidProviderConfig,
    InvalidToolArguments,
    NotFound,
    ProviderNotFound,
    ModelNotFound,
    ProviderDisabled,
    ToolDisabled,
    ChannelNotSupported,
    CronBusy,
    RiskActionRejected,
    RiskConfirmationTimeout,
    ProviderInvalidReply,
    RunnerError,
    ModelTimeout,
    ToolError,
    ToolTimeout,
    AgentServiceUnavailable,
    AgentServiceMisconfigured,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidChat => "invalid_chat",
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::InvalidEnvValue => "invalid_env_value",
            ErrorCode::InvalidModelSlot => "invalid_model_slot",
            ErrorCode::InvalidProviderId => "invalid_provider_id",
            ErrorCode::InvalidProviderConfig => "invalid_provider_config",
            ErrorCode::InvalidToolArguments => "invalid_tool_arguments",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ProviderNotFound => "provider_not_found",
            ErrorCode::ModelNotFound => "model_not_found",
            ErrorCode::ProviderDisabled => "provider_disabled",
            ErrorCode::ToolDisabled => "tool_disabled",
            ErrorCode::ChannelNotSupported => "channel_not_supported",
            ErrorCode::CronBusy => "cron_busy",
            ErrorCode::RiskActionRejected => "risk_action_rejected",
            ErrorCode::RiskConfirmationTimeout => "risk_confirmation_timeout",
            ErrorCode::ProviderInvalidReply => "provider_invalid_reply",
            ErrorCode::RunnerError => "runner_error",
            ErrorCode::ModelTimeout => "model_timeout",
            ErrorCode::ToolError => "tool_error",
            ErrorCode::ToolTimeout => "tool_timeout",
            ErrorCode::AgentServiceUnavailable => "agent_service_unavailable",
            ErrorCode::AgentServiceMisconfigured => "agent_service_misconfigured",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_as_str_matches_taxonomy() {
        assert_eq!(ErrorCode::CronBusy.as_str(), "cron_busy");
        assert_eq!(ErrorCode::ToolDisabled.as_str(), "tool_disabled");
    }
}
