//! Cron: `GET|POST /cron/jobs`, `GET|PUT|DELETE /cron/jobs/{id}`,
//! `POST /cron/jobs/{id}/pause|resume|run`, `GET /cron/jobs/{id}/state` (spec §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use gateway_core::cron::initial_next_run;
use gateway_core::store::{CronJobSpec, CronJobState, DispatchTarget, Document, JobRuntime, ScheduleSpec, StoreError};
use gateway_core::ErrorCode;

use crate::app::AppState;
use crate::response::ApiError;

#[derive(Debug, Serialize)]
pub struct CronJobView {
    #[serde(flatten)]
    pub spec: CronJobSpec,
    pub state: CronJobState,
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<CronJobView>> {
    let jobs = state.store.read(|doc| {
        doc.cron_jobs
            .values()
            .map(|spec| CronJobView {
                spec: spec.clone(),
                state: doc.cron_state.get(&spec.id).cloned().unwrap_or_default(),
            })
            .collect::<Vec<_>>()
    });
    Json(jobs)
}

#[derive(Debug, Deserialize)]
pub struct JobBody {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub request: Option<serde_json::Value>,
    pub dispatch: DispatchTarget,
    #[serde(default)]
    pub runtime: JobRuntime,
}

fn default_true() -> bool {
    true
}

pub async fn create_job(State(state): State<Arc<AppState>>, Json(body): Json<JobBody>) -> Result<Json<CronJobView>, ApiError> {
    let now = Utc::now();
    let id = body.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let spec = CronJobSpec {
        id: id.clone(),
        name: body.name,
        enabled: body.enabled,
        schedule: body.schedule,
        task_type: body.task_type,
        text: body.text,
        request: body.request,
        dispatch: body.dispatch,
        runtime: body.runtime,
        created_at: now,
        updated_at: now,
    };

    let next_run_at = initial_next_run(&spec, now).map_err(|e| ApiError::new(ErrorCode::InvalidProviderConfig, e.to_string()))?;

    state
        .store
        .write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.cron_jobs.insert(id.clone(), spec.clone());
            doc.cron_state.insert(
                id.clone(),
                CronJobState {
                    next_run_at: Some(next_run_at),
                    ..Default::default()
                },
            );
            Ok(())
        })
        .map_err(ApiError::from)?;

    Ok(Json(CronJobView {
        spec,
        state: CronJobState {
            next_run_at: Some(next_run_at),
            ..Default::default()
        },
    }))
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<CronJobView>, ApiError> {
    state
        .store
        .read(|doc| {
            doc.cron_jobs.get(&id).map(|spec| CronJobView {
                spec: spec.clone(),
                state: doc.cron_state.get(&id).cloned().unwrap_or_default(),
            })
        })
        .map(Json)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("cron job not found: {id}")))
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<JobBody>,
) -> Result<Json<CronJobView>, ApiError> {
    let created_at = state
        .store
        .read(|doc| doc.cron_jobs.get(&id).map(|s| s.created_at))
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("cron job not found: {id}")))?;

    let now = Utc::now();
    let spec = CronJobSpec {
        id: id.clone(),
        name: body.name,
        enabled: body.enabled,
        schedule: body.schedule,
        task_type: body.task_type,
        text: body.text,
        request: body.request,
        dispatch: body.dispatch,
        runtime: body.runtime,
        created_at,
        updated_at: now,
    };

    let next_run_at = initial_next_run(&spec, now).map_err(|e| ApiError::new(ErrorCode::InvalidProviderConfig, e.to_string()))?;

    state
        .store
        .write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.cron_jobs.insert(id.clone(), spec.clone());
            doc.cron_state.entry(id.clone()).or_default().next_run_at = Some(next_run_at);
            Ok(())
        })
        .map_err(ApiError::from)?;

    let job_state = state.store.read(|doc| doc.cron_state.get(&id).cloned().unwrap_or_default());
    Ok(Json(CronJobView { spec, state: job_state }))
}

pub async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .write(|doc: &mut Document| -> Result<bool, StoreError> {
            let removed = doc.cron_jobs.remove(&id).is_some();
            doc.cron_state.remove(&id);
            Ok(removed)
        })
        .map_err(ApiError::from)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::NotFound, format!("cron job not found: {id}")))
    }
}

pub async fn pause_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.scheduler.pause(&id).map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resume_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.scheduler.resume(&id).map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.scheduler.run_manual(&id).await.map_err(ApiError::from)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn job_state(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<CronJobState>, ApiError> {
    state
        .store
        .read(|doc| doc.cron_state.get(&id).cloned())
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("cron job not found: {id}")))
        .map(Json)
}
