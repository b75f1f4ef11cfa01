//! The state store: durable, consistent, single-writer persistence (spec §4.1).
//!
//! [`StateStore::read`] takes a shared lock over an in-memory [`Document`]; [`StateStore::write`]
//! takes an exclusive lock, runs the closure, and — only if it returns `Ok` — re-persists the
//! whole document atomically (write-to-temp, then rename) before releasing the lock. A closure
//! that returns `Err` leaves both the in-memory and on-disk document untouched.

pub mod types;

pub use types::{
    ActiveModelSlot, Chat, ChannelConfig, ChatKey, CronJobSpec, CronJobState, DispatchTarget,
    Document, EnvEntry, JobRuntime, ProviderSetting, RunStatus, ScheduleSpec,
};

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("read state file: {0}")]
    Read(std::io::Error),
    #[error("parse state file: {0}")]
    Parse(serde_json::Error),
    #[error("write state file: {0}")]
    Write(std::io::Error),
    #[error("serialize state: {0}")]
    Serialize(serde_json::Error),
    #[error("{0}")]
    Caller(String),
}

impl StoreError {
    pub fn caller(msg: impl Into<String>) -> Self {
        StoreError::Caller(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Caller(_) => ErrorCode::InvalidChat,
            _ => ErrorCode::AgentServiceUnavailable,
        }
    }
}

const DEFAULT_CHANNELS: &[&str] = &["console", "webhook", "qq"];

fn materialize_default_channels(doc: &mut Document) {
    for name in DEFAULT_CHANNELS {
        doc.channels.entry((*name).to_string()).or_default();
    }
}

fn normalize_providers(doc: &mut Document) {
    let normalized: std::collections::HashMap<String, ProviderSetting> = std::mem::take(&mut doc.providers)
        .into_iter()
        .map(|(id, setting)| (id.trim().to_lowercase(), setting))
        .filter(|(id, _)| id != "demo")
        .collect();
    doc.providers = normalized;

    if !doc.active_model.provider_id.is_empty() {
        let normalized_id = doc.active_model.provider_id.trim().to_lowercase();
        if !doc.providers.contains_key(&normalized_id) {
            doc.active_model = ActiveModelSlot::default();
        } else {
            doc.active_model.provider_id = normalized_id;
        }
    }
}

/// Durable JSON-document store guarded by a single in-process read/write lock.
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<Document>,
}

impl StateStore {
    /// Loads the document from `path` (creating an empty one if absent) and applies the
    /// load-time normalization rules from spec §4.1.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut doc = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(StoreError::Read)?;
            serde_json::from_str(&content).map_err(StoreError::Parse)?
        } else {
            Document::default()
        };
        materialize_default_channels(&mut doc);
        normalize_providers(&mut doc);
        let store = StateStore {
            path,
            inner: RwLock::new(doc),
        };
        store.persist_locked(&store.inner.read().expect("lock"))?;
        Ok(store)
    }

    /// Read-only access to a snapshot of the document under a shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> T {
        let guard = self.inner.read().expect("state store lock poisoned");
        f(&guard)
    }

    /// Exclusive, transactional access: `f` may mutate the document. If `f` returns `Ok`, the
    /// whole document is atomically re-persisted before this call returns `Ok`; if `f` returns
    /// `Err`, neither the in-memory nor on-disk document changes.
    pub fn write<T, E>(&self, f: impl FnOnce(&mut Document) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.inner.write().expect("state store lock poisoned");
        let mut staged = guard.clone();
        let result = f(&mut staged)?;
        if let Err(e) = self.persist_locked(&staged) {
            return Err(e.into());
        }
        *guard = staged;
        Ok(result)
    }

    fn persist_locked(&self, doc: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(doc).map_err(StoreError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(StoreError::Write)?;
        std::fs::rename(&tmp_path, &self.path).map_err(StoreError::Write)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct TestErr(String);
    impl From<StoreError> for TestErr {
        fn from(e: StoreError) -> Self {
            TestErr(e.to_string())
        }
    }

    #[test]
    fn load_missing_file_creates_empty_document_with_default_channels() {
        let dir = tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store.read(|doc| {
            assert!(doc.channels.contains_key("console"));
            assert!(doc.channels.contains_key("webhook"));
            assert!(doc.channels.contains_key("qq"));
        });
        assert!(dir.path().join("state.json").exists());
    }

    #[test]
    fn write_success_persists_and_subsequent_read_observes_mutation() {
        let dir = tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store
            .write(|doc: &mut Document| -> Result<(), TestErr> {
                doc.envs.insert(
                    "FOO".into(),
                    EnvEntry {
                        value: "bar".into(),
                        updated_at: chrono::Utc::now(),
                    },
                );
                Ok(())
            })
            .unwrap();

        store.read(|doc| {
            assert_eq!(doc.envs.get("FOO").unwrap().value, "bar");
        });

        // Reload fresh from disk to verify durability.
        let reloaded = StateStore::load(dir.path().join("state.json")).unwrap();
        reloaded.read(|doc| {
            assert_eq!(doc.envs.get("FOO").unwrap().value, "bar");
        });
    }

    #[test]
    fn write_error_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        let result = store.write(|doc: &mut Document| -> Result<(), TestErr> {
            doc.envs.insert(
                "SHOULD_NOT_PERSIST".into(),
                EnvEntry {
                    value: "x".into(),
                    updated_at: chrono::Utc::now(),
                },
            );
            Err(TestErr("boom".into()))
        });
        assert!(result.is_err());
        store.read(|doc| {
            assert!(!doc.envs.contains_key("SHOULD_NOT_PERSIST"));
        });
    }

    #[test]
    fn legacy_demo_provider_is_stripped_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "providers": {"Demo": {}, " OpenAI ": {}},
                "active_model": {"provider_id": "demo", "model": "x"}
            })
            .to_string(),
        )
        .unwrap();
        let store = StateStore::load(&path).unwrap();
        store.read(|doc| {
            assert!(!doc.providers.contains_key("demo"));
            assert!(doc.providers.contains_key("openai"));
            // active_model referenced the removed "demo" provider, so it is cleared.
            assert!(doc.active_model.is_unset());
        });
    }

    #[test]
    fn find_chat_id_matches_on_session_user_channel() {
        let dir = tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        let chat = Chat {
            id: "c1".into(),
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: "console".into(),
            name: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store
            .write(|doc: &mut Document| -> Result<(), TestErr> {
                doc.chats.insert(chat.id.clone(), chat.clone());
                Ok(())
            })
            .unwrap();
        store.read(|doc| {
            let key = ChatKey::new("s1", "u1", "console");
            assert_eq!(doc.find_chat_id(&key), Some("c1".to_string()));
            let miss = ChatKey::new("s1", "u1", "qq");
            assert_eq!(doc.find_chat_id(&miss), None);
        });
    }
}
