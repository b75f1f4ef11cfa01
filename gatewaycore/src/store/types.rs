//! Entity types persisted in the state store document (spec §3).

use crate::message::RuntimeMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chat thread, uniquely identified by `(session_id, user_id, channel)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// The `(session_id, user_id, channel)` key used to look up a chat thread.
    pub fn key(&self) -> ChatKey {
        ChatKey {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            channel: self.channel.clone(),
        }
    }
}

/// The natural key for a chat thread. Encoded as a single string when used as a
/// map key so the document stays plain JSON.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
}

impl ChatKey {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            channel: channel.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.session_id, self.user_id, self.channel)
    }
}

/// A configured LLM provider: credentials, endpoint, and user-defined model aliases.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderSetting {
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

impl Default for ProviderSetting {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            display_name: None,
            enabled: true,
            headers: HashMap::new(),
            timeout_ms: 0,
            model_aliases: HashMap::new(),
        }
    }
}

/// Which provider/model the gateway uses when a request does not name one explicitly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActiveModelSlot {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
}

impl ActiveModelSlot {
    pub fn is_unset(&self) -> bool {
        self.provider_id.is_empty() && self.model.is_empty()
    }
}

/// How a cron job's schedule is expressed (spec §3: interval or 5-field cron).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Interval { cron: String },
    Cron { cron: String, #[serde(default)] timezone: Option<String> },
}

/// Runtime limits for one cron job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRuntime {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub misfire_grace_seconds: u64,
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            misfire_grace_seconds: 0,
        }
    }
}

/// Where a cron job's generated reply is sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub channel: String,
    #[serde(default)]
    pub target: serde_json::Value,
}

/// A scheduled job definition (spec §3 `CronJobSpec`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CronJobSpec {
    pub id: String,
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
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Whether a cron job run is in flight, succeeded, or failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// The mutable, continuously-updated side of a cron job (spec §3 `CronJobState`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CronJobState {
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: Option<RunStatus>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

/// A configured channel (spec §6): a JSON object of recognized keys per channel kind.
pub type ChannelConfig = serde_json::Map<String, serde_json::Value>;

/// One environment override, surfaced through `GET|PUT /envs`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvEntry {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// The whole persisted document (spec §2: "a single persistent document").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub chats: HashMap<String, Chat>,
    #[serde(default)]
    pub histories: HashMap<String, Vec<RuntimeMessage>>,
    #[serde(default)]
    pub cron_jobs: HashMap<String, CronJobSpec>,
    #[serde(default)]
    pub cron_state: HashMap<String, CronJobState>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSetting>,
    #[serde(default)]
    pub active_model: ActiveModelSlot,
    #[serde(default)]
    pub envs: HashMap<String, EnvEntry>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(default)]
    pub skills: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Finds the chat id matching `(session_id, user_id, channel)`, if any.
    pub fn find_chat_id(&self, key: &ChatKey) -> Option<String> {
        self.chats
            .values()
            .find(|c| &c.key() == key)
            .map(|c| c.id.clone())
    }
}
