//! `POST /channels/qq/inbound` (spec §6): an inbound QQ event triggers one
//! agent turn and dispatches the reply back out through the `qq` channel.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use gateway_core::request::{AgentProcessRequest, GenerateConfig};
use gateway_core::{channels, ErrorCode};

use crate::app::AppState;
use crate::response::ApiError;

#[derive(Debug, Deserialize)]
pub struct QqInboundBody {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub target_type: Option<String>,
    pub target_id: String,
}

#[derive(Debug, Serialize)]
pub struct QqInboundResponse {
    pub reply: String,
}

pub async fn qq_inbound(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QqInboundBody>,
) -> Result<Json<QqInboundResponse>, ApiError> {
    let session_id = body.session_id.unwrap_or_else(|| format!("qq:{}", body.target_id));
    let request = AgentProcessRequest {
        session_id,
        user_id: body.user_id,
        channel: "qq".to_string(),
        text: body.content,
        tool: None,
        generate: GenerateConfig::default(),
        biz_params: None,
    };

    let outcome = state.orchestrator.process(request).await.map_err(ApiError::from)?;

    let channel_config = state.store.read(|doc| doc.channels.get("qq").cloned()).unwrap_or_default();
    let mut config = channel_config;
    config
        .entry("target_type".to_string())
        .or_insert_with(|| serde_json::Value::String(body.target_type.unwrap_or_else(|| "c2c".to_string())));
    let target = serde_json::Value::String(body.target_id);

    let channel = channels::resolve("qq").map_err(ApiError::from)?;
    channel
        .send_text(&target, &config, &outcome.reply)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(QqInboundResponse { reply: outcome.reply }))
}
