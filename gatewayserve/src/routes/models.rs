//! Models: `GET /models`, `GET /models/catalog`, `PUT /models/{provider_id}/config`,
//! `DELETE /models/{provider_id}`, `GET|PUT /models/active` (spec §3, §6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use gateway_core::provider::{ModelInfo, ProviderRegistry};
use gateway_core::store::{ActiveModelSlot, Document, ProviderSetting, StoreError};
use gateway_core::ErrorCode;

use crate::app::AppState;
use crate::response::ApiError;

/// Provider settings as exposed over HTTP: `api_key` is never echoed back, only
/// whether one is configured.
#[derive(Debug, Serialize)]
pub struct ProviderView {
    pub id: String,
    pub display_name: Option<String>,
    pub base_url: Option<String>,
    pub enabled: bool,
    pub has_api_key: bool,
    pub model_aliases: HashMap<String, String>,
    pub models: Vec<ModelInfo>,
}

fn provider_view(id: &str, setting: &ProviderSetting, registry: &ProviderRegistry) -> ProviderView {
    ProviderView {
        id: id.to_string(),
        display_name: setting.display_name.clone(),
        base_url: setting.base_url.clone(),
        enabled: setting.enabled,
        has_api_key: !setting.api_key.is_empty(),
        model_aliases: setting.model_aliases.clone(),
        models: registry.resolve_models(id, &setting.model_aliases),
    }
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderView>> {
    let views = state.store.read(|doc| {
        doc.providers
            .iter()
            .map(|(id, setting)| provider_view(id, setting, &state.providers))
            .collect::<Vec<_>>()
    });
    Json(views)
}

#[derive(Debug, Serialize)]
pub struct CatalogEntryView {
    pub provider_id: String,
    pub models: Vec<ModelInfo>,
}

/// The built-in catalog plus every configured provider's resolved models.
pub async fn catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntryView>> {
    let configured = state.store.read(|doc| doc.providers.clone());
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in std::iter::once("openai".to_string()).chain(configured.keys().cloned()) {
        if !seen.insert(id.clone()) {
            continue;
        }
        let aliases = configured.get(&id).map(|s| s.model_aliases.clone()).unwrap_or_default();
        out.push(CatalogEntryView {
            models: state.providers.resolve_models(&id, &aliases),
            provider_id: id,
        });
    }
    Json(out)
}

#[derive(Debug, Deserialize)]
pub struct UpsertProviderBody {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

pub async fn upsert_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    Json(body): Json<UpsertProviderBody>,
) -> Result<Json<ProviderView>, ApiError> {
    let provider_id = provider_id.trim().to_lowercase();
    if provider_id.is_empty() {
        return Err(ApiError::new(ErrorCode::InvalidProviderId, "provider id must not be empty"));
    }
    for (alias, target) in &body.model_aliases {
        if alias.trim().is_empty() || target.trim().is_empty() {
            return Err(ApiError::new(ErrorCode::InvalidProviderConfig, "model alias key/value must be non-empty"));
        }
    }

    let setting = ProviderSetting {
        api_key: body.api_key,
        base_url: body.base_url,
        display_name: body.display_name,
        enabled: body.enabled,
        headers: body.headers,
        timeout_ms: body.timeout_ms,
        model_aliases: body.model_aliases,
    };

    state
        .store
        .write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.providers.insert(provider_id.clone(), setting.clone());
            Ok(())
        })
        .map_err(ApiError::from)?;

    Ok(Json(provider_view(&provider_id, &setting, &state.providers)))
}

pub async fn delete_provider(State(state): State<Arc<AppState>>, Path(provider_id): Path<String>) -> Result<StatusCode, ApiError> {
    let provider_id = provider_id.trim().to_lowercase();
    let removed = state
        .store
        .write(|doc: &mut Document| -> Result<bool, StoreError> {
            let removed = doc.providers.remove(&provider_id).is_some();
            if doc.active_model.provider_id == provider_id {
                doc.active_model = ActiveModelSlot::default();
            }
            Ok(removed)
        })
        .map_err(ApiError::from)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::ProviderNotFound, format!("provider not found: {provider_id}")))
    }
}

pub async fn get_active_model(State(state): State<Arc<AppState>>) -> Json<ActiveModelSlot> {
    Json(state.store.read(|doc| doc.active_model.clone()))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveModelBody {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
}

pub async fn set_active_model(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetActiveModelBody>,
) -> Result<Json<ActiveModelSlot>, ApiError> {
    let provider_id = body.provider_id.trim().to_lowercase();
    let model = body.model.trim().to_string();

    if provider_id.is_empty() != model.is_empty() {
        return Err(ApiError::new(
            ErrorCode::InvalidModelSlot,
            "provider_id and model must both be set or both be empty",
        ));
    }

    if !provider_id.is_empty() {
        let aliases = state
            .store
            .read(|doc| doc.providers.get(&provider_id).map(|s| s.model_aliases.clone()))
            .ok_or_else(|| ApiError::new(ErrorCode::ProviderNotFound, format!("provider not found: {provider_id}")))?;
        if state.providers.resolve_model_id(&provider_id, &model, &aliases).is_none() {
            return Err(ApiError::new(ErrorCode::ModelNotFound, format!("model not found: {model}")));
        }
    }

    let slot = ActiveModelSlot { provider_id, model };
    state
        .store
        .write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.active_model = slot.clone();
            Ok(())
        })
        .map_err(ApiError::from)?;

    Ok(Json(slot))
}
