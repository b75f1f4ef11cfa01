//! The error envelope every failed response shares: `{ "error": { "code",
//! "message", "details"? } }` (spec §6/§7). Every `gateway_core` error type
//! that a route can surface converts into an [`ApiError`] here, in one place,
//! so the status-code mapping lives nowhere else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use gateway_core::channels::ChannelError;
use gateway_core::cron::{ScheduleError, SchedulerError};
use gateway_core::tools::ToolError;
use gateway_core::{ErrorCode, OrchestratorError, StoreError};

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn status_for_code(code: ErrorCode) -> StatusCode {
    use ErrorCode::*;
    match code {
        InvalidChat | InvalidJson | InvalidEnvValue | InvalidModelSlot | InvalidProviderId | InvalidProviderConfig
        | InvalidToolArguments | ProviderDisabled | ChannelNotSupported => StatusCode::BAD_REQUEST,
        NotFound | ProviderNotFound | ModelNotFound => StatusCode::NOT_FOUND,
        ToolDisabled | RiskActionRejected => StatusCode::FORBIDDEN,
        CronBusy => StatusCode::CONFLICT,
        RiskConfirmationTimeout | ModelTimeout | ToolTimeout => StatusCode::GATEWAY_TIMEOUT,
        ProviderInvalidReply | RunnerError => StatusCode::BAD_GATEWAY,
        ToolError | AgentServiceUnavailable | AgentServiceMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for_code(self.code);
        let mut error = serde_json::Map::new();
        error.insert("code".to_string(), serde_json::Value::String(self.code.as_str().to_string()));
        error.insert("message".to_string(), serde_json::Value::String(self.message));
        if let Some(details) = self.details {
            error.insert("details".to_string(), details);
        }
        (status, Json(serde_json::json!({ "error": error }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<ChannelError> for ApiError {
    fn from(err: ChannelError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        ApiError::new(ErrorCode::AgentServiceMisconfigured, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_for_code(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cron_busy_maps_to_409() {
        assert_eq!(status_for_code(ErrorCode::CronBusy), StatusCode::CONFLICT);
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let response = ApiError::new(ErrorCode::NotFound, "nope").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
