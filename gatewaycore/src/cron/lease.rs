//! Filesystem leases: the sole cross-process coordination primitive for cron
//! concurrency slots (spec §4.5, §5). A lease's existence, within its
//! `expires_at`, is exclusive ownership of `(job_id, slot)`.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: String,
    pub job_id: String,
    pub owner: String,
    pub slot: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn job_dir(leases_root: &Path, job_id: &str) -> PathBuf {
    leases_root.join(URL_SAFE_NO_PAD.encode(job_id))
}

fn slot_path(leases_root: &Path, job_id: &str, slot: u32) -> PathBuf {
    job_dir(leases_root, job_id).join(format!("slot-{slot}.json"))
}

/// Tries to acquire the first free slot in `[0, max_concurrency)` for `job_id`.
/// A slot is free if no lease file exists, or the existing one is expired and
/// gets reclaimed (removed, then recreated atomically). Returns `None` if
/// every slot is currently held by a live lease.
pub fn try_acquire(
    leases_root: &Path,
    job_id: &str,
    max_concurrency: u32,
    owner: &str,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> std::io::Result<Option<Lease>> {
    std::fs::create_dir_all(job_dir(leases_root, job_id))?;
    for slot in 0..max_concurrency {
        let path = slot_path(leases_root, job_id, slot);
        if let Some(existing) = read_lease(&path)? {
            if !existing.is_expired(now) {
                continue;
            }
            // Stale: reclaim by removing before attempting create-exclusive below.
            let _ = std::fs::remove_file(&path);
        }

        let lease = Lease {
            lease_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            slot,
            acquired_at: now,
            expires_at: now + ttl,
        };
        let json = serde_json::to_string_pretty(&lease)?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(json.as_bytes())?;
                return Ok(Some(lease));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

pub fn release(leases_root: &Path, lease: &Lease) -> std::io::Result<()> {
    let path = slot_path(leases_root, &lease.job_id, lease.slot);
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn read_lease(path: &Path) -> std::io::Result<Option<Lease>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Count of currently live (non-expired) leases for `job_id`, across all slots.
pub fn live_count(leases_root: &Path, job_id: &str, max_concurrency: u32, now: DateTime<Utc>) -> std::io::Result<u32> {
    let mut count = 0;
    for slot in 0..max_concurrency {
        if let Some(lease) = read_lease(&slot_path(leases_root, job_id, slot))? {
            if !lease.is_expired(now) {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Every lease file found under `leases_root`, regardless of job or expiry —
/// used by restart recovery to reconcile the whole lease directory.
pub fn list_all(leases_root: &Path) -> std::io::Result<Vec<(PathBuf, Lease)>> {
    let mut out = Vec::new();
    if !leases_root.exists() {
        return Ok(out);
    }
    for job_entry in std::fs::read_dir(leases_root)? {
        let job_entry = job_entry?;
        if !job_entry.file_type()?.is_dir() {
            continue;
        }
        for slot_entry in std::fs::read_dir(job_entry.path())? {
            let slot_entry = slot_entry?;
            if let Some(lease) = read_lease(&slot_entry.path())? {
                out.push((slot_entry.path(), lease));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_fills_slots_then_reports_busy() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let ttl = chrono::Duration::seconds(60);

        let first = try_acquire(dir.path(), "job-1", 1, "owner-a", ttl, now).unwrap();
        assert!(first.is_some());

        let second = try_acquire(dir.path(), "job-1", 1, "owner-b", ttl, now).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let dir = tempdir().unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        let ttl = chrono::Duration::seconds(60);

        let stale = try_acquire(dir.path(), "job-1", 1, "owner-a", ttl, past).unwrap().unwrap();
        assert!(stale.is_expired(Utc::now()));

        let reclaimed = try_acquire(dir.path(), "job-1", 1, "owner-b", ttl, Utc::now()).unwrap();
        assert!(reclaimed.is_some());
    }

    #[test]
    fn release_then_reacquire_succeeds() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let ttl = chrono::Duration::seconds(60);

        let lease = try_acquire(dir.path(), "job-1", 1, "owner-a", ttl, now).unwrap().unwrap();
        release(dir.path(), &lease).unwrap();

        let again = try_acquire(dir.path(), "job-1", 1, "owner-b", ttl, now).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn list_all_finds_leases_across_jobs() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let ttl = chrono::Duration::seconds(60);
        try_acquire(dir.path(), "job-1", 1, "owner-a", ttl, now).unwrap();
        try_acquire(dir.path(), "job-2", 1, "owner-a", ttl, now).unwrap();

        let all = list_all(dir.path()).unwrap();
        assert_eq!(all.len(), 2);
    }
}
