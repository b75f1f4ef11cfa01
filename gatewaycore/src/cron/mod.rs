//! Cron Scheduler (spec §4.5): persistent scheduling with
//! at-most-one-active-run-per-slot semantics, coordinated purely through
//! filesystem leases.

mod lease;
mod schedule;

pub use schedule::ScheduleError;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::channels::{self, ChannelError};
use crate::error::ErrorCode;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::request::{AgentProcessRequest, GenerateConfig};
use crate::store::{CronJobSpec, Document, RunStatus, ScheduleSpec, StateStore, StoreError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no free slot: max_concurrency reached")]
    Busy,
    #[error("cron job not found: {0}")]
    NotFound(String),
    #[error("job run timed out")]
    Timeout,
    #[error("invalid job request template: {0}")]
    InvalidJobRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SchedulerError::Busy => ErrorCode::CronBusy,
            SchedulerError::NotFound(_) => ErrorCode::NotFound,
            SchedulerError::Timeout => ErrorCode::ModelTimeout,
            SchedulerError::InvalidJobRequest(_) => ErrorCode::InvalidProviderConfig,
            SchedulerError::Store(e) => e.code(),
            SchedulerError::Orchestrator(e) => e.code(),
            SchedulerError::Channel(e) => e.code(),
            SchedulerError::Schedule(_) => ErrorCode::AgentServiceMisconfigured,
            SchedulerError::Io(_) => ErrorCode::AgentServiceUnavailable,
        }
    }
}

fn compute_next_run(
    job: &CronJobSpec,
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, ScheduleError> {
    match &job.schedule {
        ScheduleSpec::Interval { cron } => {
            let duration = schedule::parse_interval(cron)?;
            Ok(now + duration)
        }
        ScheduleSpec::Cron { cron, timezone } => {
            let tz = schedule::resolve_timezone(timezone.as_deref())?;
            schedule::next_cron_occurrence(cron, tz, previous.unwrap_or(now))
        }
    }
}

/// Computes a freshly created job's first `next_run_at` (spec §4.5: "per
/// enabled job it computes `next_run_at` once and stores it"). Used by the
/// HTTP create/update handlers, which own persistence themselves.
pub fn initial_next_run(job: &CronJobSpec, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    compute_next_run(job, now, None)
}

/// Recomputation used specifically on restart recovery, honoring
/// `misfire_grace_seconds` for interval jobs (spec §4.5 "Interval").
fn recompute_on_recovery(
    job: &CronJobSpec,
    existing_next: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    match &job.schedule {
        ScheduleSpec::Interval { cron } => {
            let duration = schedule::parse_interval(cron)?;
            let grace = chrono::Duration::seconds(job.runtime.misfire_grace_seconds as i64);
            match existing_next {
                Some(next) if next > now - grace => Ok(next),
                _ => Ok(now + duration),
            }
        }
        ScheduleSpec::Cron { cron, timezone } => {
            let tz = schedule::resolve_timezone(timezone.as_deref())?;
            schedule::next_cron_occurrence(cron, tz, now)
        }
    }
}

fn build_request(job: &CronJobSpec) -> Result<AgentProcessRequest, SchedulerError> {
    if let Some(template) = &job.request {
        serde_json::from_value(template.clone()).map_err(|e| SchedulerError::InvalidJobRequest(e.to_string()))
    } else {
        Ok(AgentProcessRequest {
            session_id: format!("cron:{}", job.id),
            user_id: "cron".to_string(),
            channel: job.dispatch.channel.clone(),
            text: job.text.clone().unwrap_or_default(),
            tool: None,
            generate: GenerateConfig::default(),
            biz_params: None,
        })
    }
}

fn truncate_error(message: &str) -> String {
    crate::orchestrator::truncate_summary(message.trim())
}

/// Coordinates one dispatcher tick loop and the worker tasks it spawns. All
/// public entry points take `self: &Arc<Self>` so job bodies can be spawned
/// as independent tokio tasks.
pub struct CronScheduler {
    store: Arc<StateStore>,
    orchestrator: Arc<Orchestrator>,
    leases_root: PathBuf,
    owner: String,
}

impl CronScheduler {
    pub fn new(store: Arc<StateStore>, orchestrator: Arc<Orchestrator>, leases_root: PathBuf, owner: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            store,
            orchestrator,
            leases_root,
            owner: owner.into(),
        })
    }

    /// Restart recovery (spec §4.5): discard expired leases, fail orphaned
    /// unexpired ones with `last_error=interrupted`, then recompute
    /// `next_run_at` for every enabled job.
    pub fn recover(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let leases = lease::list_all(&self.leases_root)?;

        self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
            for (path, found) in &leases {
                if found.is_expired(now) {
                    let _ = std::fs::remove_file(path);
                    continue;
                }
                if doc.cron_jobs.contains_key(&found.job_id) {
                    let state = doc.cron_state.entry(found.job_id.clone()).or_default();
                    state.last_status = Some(RunStatus::Failed);
                    state.last_error = Some("interrupted".to_string());
                }
                let _ = std::fs::remove_file(path);
            }

            let jobs: Vec<CronJobSpec> = doc.cron_jobs.values().cloned().collect();
            for job in jobs {
                if !job.enabled {
                    continue;
                }
                let existing = doc.cron_state.get(&job.id).and_then(|s| s.next_run_at);
                if let Ok(next) = recompute_on_recovery(&job, existing, now) {
                    doc.cron_state.entry(job.id.clone()).or_default().next_run_at = Some(next);
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// One dispatcher tick: finds due, enabled, unpaused jobs and attempts to
    /// start each. Jobs that find no free slot are retried on the next tick.
    pub async fn tick(self: &Arc<Self>) {
        let now = Utc::now();
        let due: Vec<(CronJobSpec, Option<DateTime<Utc>>)> = self.store.read(|doc| {
            doc.cron_jobs
                .values()
                .filter(|job| job.enabled)
                .filter_map(|job| {
                    let state = doc.cron_state.get(&job.id);
                    if state.map(|s| s.paused).unwrap_or(false) {
                        return None;
                    }
                    let next_run_at = state.and_then(|s| s.next_run_at);
                    let due = next_run_at.map(|t| t <= now).unwrap_or(true);
                    due.then(|| (job.clone(), next_run_at))
                })
                .collect()
        });

        for (job, due_at) in due {
            match self.try_start(&job, now) {
                Ok(Some(lease)) => {
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.run_job_body(job, lease, due_at).await });
                }
                Ok(None) => {
                    tracing::debug!(job_id = %job.id, "cron job has no free slot this tick");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "cron tick failed to acquire lease");
                }
            }
        }
    }

    /// Runs the dispatcher loop until the process exits, ticking every
    /// `interval`.
    pub async fn run_forever(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// `/cron/jobs/{id}/run`: follows the same lease protocol as a tick.
    /// Returns [`SchedulerError::Busy`] (cron_busy, 409) if no slot is free.
    pub async fn run_manual(self: &Arc<Self>, job_id: &str) -> Result<(), SchedulerError> {
        let job = self
            .store
            .read(|doc| doc.cron_jobs.get(job_id).cloned())
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        let due_at = self.store.read(|doc| doc.cron_state.get(job_id).and_then(|s| s.next_run_at));

        match self.try_start(&job, now)? {
            Some(lease) => {
                let this = Arc::clone(self);
                let job_for_task = job.clone();
                tokio::spawn(async move { this.run_job_body(job_for_task, lease, due_at).await });
                Ok(())
            }
            None => {
                self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
                    let state = doc.cron_state.entry(job_id.to_string()).or_default();
                    state.last_status = Some(RunStatus::Failed);
                    state.last_error = Some(format!("no free slot: max_concurrency={} reached", job.runtime.max_concurrency));
                    Ok(())
                })?;
                Err(SchedulerError::Busy)
            }
        }
    }

    pub fn pause(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.cron_state.entry(job_id.to_string()).or_default().paused = true;
            Ok(())
        })?;
        Ok(())
    }

    pub fn resume(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
            doc.cron_state.entry(job_id.to_string()).or_default().paused = false;
            Ok(())
        })?;
        Ok(())
    }

    fn try_start(&self, job: &CronJobSpec, now: DateTime<Utc>) -> Result<Option<lease::Lease>, SchedulerError> {
        let ttl = chrono::Duration::seconds(job.runtime.timeout_seconds as i64 + 30);
        let acquired = lease::try_acquire(&self.leases_root, &job.id, job.runtime.max_concurrency, &self.owner, ttl, now)?;
        if acquired.is_some() {
            self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
                let state = doc.cron_state.entry(job.id.clone()).or_default();
                state.last_status = Some(RunStatus::Running);
                state.last_run_at = Some(now);
                Ok(())
            })?;
        }
        Ok(acquired)
    }

    async fn run_job_body(self: Arc<Self>, job: CronJobSpec, acquired_lease: lease::Lease, due_at: Option<DateTime<Utc>>) {
        let outcome = self.execute(&job).await;
        let (status, error_message) = match &outcome {
            Ok(()) => (RunStatus::Succeeded, None),
            Err(e) => (RunStatus::Failed, Some(truncate_error(&e.to_string()))),
        };

        let _ = self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
            let state = doc.cron_state.entry(job.id.clone()).or_default();
            state.last_status = Some(status);
            state.last_error = error_message;
            Ok(())
        });

        let _ = lease::release(&self.leases_root, &acquired_lease);

        let now = Utc::now();
        if let Ok(next) = compute_next_run(&job, now, due_at) {
            let _ = self.store.write(|doc: &mut Document| -> Result<(), StoreError> {
                doc.cron_state.entry(job.id.clone()).or_default().next_run_at = Some(next);
                Ok(())
            });
        }
    }

    async fn execute(&self, job: &CronJobSpec) -> Result<(), SchedulerError> {
        let request = build_request(job)?;
        let timeout = std::time::Duration::from_secs(job.runtime.timeout_seconds);
        let outcome = tokio::time::timeout(timeout, self.orchestrator.process(request))
            .await
            .map_err(|_| SchedulerError::Timeout)??;

        let channel_config = self.store.read(|doc| doc.channels.get(&job.dispatch.channel).cloned()).unwrap_or_default();
        let channel = channels::resolve(&job.dispatch.channel)?;
        channel.send_text(&job.dispatch.target, &channel_config, &outcome.reply).await?;
        Ok(())
    }
}
