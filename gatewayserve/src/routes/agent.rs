//! `POST /agent/process` (spec §6): runs one agent turn, non-streaming
//! (`{reply, events[]}`) or as Server-Sent Events when `stream: true`.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use gateway_core::request::{AgentProcessRequest, GenerateConfig};
use gateway_core::ErrorCode;

use crate::app::AppState;
use crate::response::ApiError;

/// `input` accepts a bare string or a part-array (`[{"type":"text","text":"..."}]`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Text(String),
    Parts(Vec<InputPart>),
}

#[derive(Debug, Deserialize)]
pub struct InputPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl InputValue {
    fn into_text(self) -> String {
        match self {
            InputValue::Text(s) => s,
            InputValue::Parts(parts) => parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentProcessBody {
    pub input: InputValue,
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub biz_params: Option<serde_json::Value>,
}

pub async fn process(State(state): State<Arc<AppState>>, Json(body): Json<AgentProcessBody>) -> Result<Response, ApiError> {
    // Open question in the contract: an omitted `channel` defaults to "console".
    let channel = body.channel.clone().unwrap_or_else(|| "console".to_string());
    gateway_core::channels::resolve(&channel).map_err(ApiError::from)?;

    let request = AgentProcessRequest {
        session_id: body.session_id,
        user_id: body.user_id,
        channel,
        text: body.input.into_text(),
        tool: None,
        generate: GenerateConfig::default(),
        biz_params: body.biz_params,
    };

    if body.stream {
        Ok(stream_response(state, request))
    } else {
        let outcome = state.orchestrator.process(request).await.map_err(ApiError::from)?;
        Ok(Json(serde_json::json!({ "reply": outcome.reply, "events": outcome.events })).into_response())
    }
}

fn stream_response(state: Arc<AppState>, request: AgentProcessRequest) -> Response {
    use axum::body::Body;
    use axum::http::header;

    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let _ = state.orchestrator.process_stream(request, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|line| Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(line)));

    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        crate::app::test_state_in(dir.path())
    }

    #[tokio::test]
    async fn unsupported_channel_is_rejected() {
        let state = test_state();
        let body = AgentProcessBody {
            input: InputValue::Text("hi".to_string()),
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: Some("sms".into()),
            stream: false,
            biz_params: None,
        };
        let err = process(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ChannelNotSupported);
    }

    #[tokio::test]
    async fn missing_channel_defaults_to_console() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, calls) = crate::app::CountingToolCallAdapter::new();
        let state = crate::app::test_state_with_adapter_in(dir.path(), adapter);

        // First turn with no `channel` to prove the default still reaches the
        // runner and establishes a chat record.
        let first = AgentProcessBody {
            input: InputValue::Text("hi".to_string()),
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: None,
            stream: false,
            biz_params: None,
        };
        assert!(process(State(Arc::clone(&state)), Json(first)).await.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2, "echo tool call then final reply");

        // `/new` (spec §8 scenario 6) defaults the channel to "console" the same
        // way, but must reset history without ever calling the runner again.
        let reset = AgentProcessBody {
            input: InputValue::Text("/new".to_string()),
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: None,
            stream: false,
            biz_params: None,
        };
        assert!(process(State(Arc::clone(&state)), Json(reset)).await.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2, "runner must not be called for /new");

        let key = gateway_core::store::ChatKey::new("s1", "u1", "console");
        let chat_id = state.store.read(|doc| doc.find_chat_id(&key));
        assert!(chat_id.is_some(), "chat record must be preserved across /new");
        let chat_id = chat_id.unwrap();
        let history_len = state.store.read(|doc| doc.histories.get(&chat_id).map(|h| h.len()));
        assert_eq!(history_len, Some(0), "history must be empty after /new");
    }
}
