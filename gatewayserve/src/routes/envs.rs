//! Envs: `GET|PUT /envs`, `DELETE /envs/{key}` (spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use gateway_core::store::{Document, EnvEntry, StoreError};
use gateway_core::ErrorCode;

use crate::app::AppState;
use crate::response::ApiError;

pub async fn list_envs(State(state): State<Arc<AppState>>) -> Json<HashMap<String, EnvEntry>> {
    Json(state.store.read(|doc| doc.envs.clone()))
}

#[derive(Debug, Deserialize)]
pub struct SetEnvsBody(HashMap<String, String>);

pub async fn set_envs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetEnvsBody>,
) -> Result<Json<HashMap<String, EnvEntry>>, ApiError> {
    for key in body.0.keys() {
        if key.trim().is_empty() {
            return Err(ApiError::new(ErrorCode::InvalidEnvValue, "env key must not be empty"));
        }
    }

    let now = Utc::now();
    state
        .store
        .write(|doc: &mut Document| -> Result<(), StoreError> {
            for (key, value) in &body.0 {
                doc.envs.insert(key.clone(), EnvEntry { value: value.clone(), updated_at: now });
            }
            Ok(())
        })
        .map_err(ApiError::from)?;

    Ok(Json(state.store.read(|doc| doc.envs.clone())))
}

pub async fn delete_env(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .write(|doc: &mut Document| -> Result<bool, StoreError> { Ok(doc.envs.remove(&key).is_some()) })
        .map_err(ApiError::from)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::NotFound, format!("env not found: {key}")))
    }
}
