// ABOUTME: Run lock preventing two bootstraps of the same instance at once.
// ABOUTME: Atomic create-new lock file in the state directory, holding who took it and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::ResourceName;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("instance is locked by {holder} (pid {pid}) since {started_at}; use --force to break it")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock acquired by another process while breaking a stale lock")]
    Contended,

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Information about who holds a run lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub instance: String,
}

impl LockInfo {
    pub fn new(instance: &ResourceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            instance: instance.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    pub fn lock_path(state_dir: &Path, instance: &ResourceName) -> PathBuf {
        state_dir.join(format!("{}.lock", instance))
    }
}

/// A held run lock; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `instance`.
    ///
    /// Stale (over an hour) and unreadable locks are broken with a warning;
    /// live ones only with `force`.
    pub fn acquire(state_dir: &Path, instance: &ResourceName, force: bool) -> Result<Self, LockError> {
        fs::create_dir_all(state_dir).map_err(|source| LockError::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let path = LockInfo::lock_path(state_dir, instance);
        let info = LockInfo::new(instance);

        if Self::try_create(&path, &info)? {
            return Ok(Self { path });
        }

        if !Self::should_break(&path, force)? {
            return match read_info(&path) {
                Some(existing) => Err(LockError::Held {
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                }),
                None => Err(LockError::Contended),
            };
        }

        tracing::debug!("Removing stale/forced lock at {}", path.display());
        let _ = fs::remove_file(&path);

        if Self::try_create(&path, &info)? {
            Ok(Self { path })
        } else {
            Err(LockError::Contended)
        }
    }

    /// Create the lock file if absent. False if someone else holds it.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_err(e)),
        };

        let json = serde_json::to_vec(info)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        file.write_all(&json).map_err(io_err)?;
        Ok(true)
    }

    fn should_break(path: &Path, force: bool) -> Result<bool, LockError> {
        let Some(existing) = read_info(path) else {
            if path.exists() {
                tracing::warn!("Lock info unreadable, breaking lock");
            }
            return Ok(true);
        };

        if force {
            tracing::warn!(
                "Breaking lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else if existing.is_stale() {
            tracing::warn!(
                "Auto-breaking stale lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ResourceName {
        ResourceName::new("demo").unwrap()
    }

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new(&instance());

        assert_eq!(info.instance, "demo");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        assert!(!LockInfo::new(&instance()).is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&instance());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = RunLock::acquire(dir.path(), &instance(), false).unwrap();

        let err = RunLock::acquire(dir.path(), &instance(), false).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));

        drop(lock);
        assert!(RunLock::acquire(dir.path(), &instance(), false).is_ok());
    }

    #[test]
    fn force_breaks_live_lock() {
        let dir = tempfile::tempdir().unwrap();
        let _held = RunLock::acquire(dir.path(), &instance(), false).unwrap();
        assert!(RunLock::acquire(dir.path(), &instance(), true).is_ok());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = LockInfo::new(&instance());
        info.started_at = Utc::now() - chrono::Duration::hours(3);
        fs::write(
            LockInfo::lock_path(dir.path(), &instance()),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        assert!(RunLock::acquire(dir.path(), &instance(), false).is_ok());
    }

    #[test]
    fn corrupted_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(LockInfo::lock_path(dir.path(), &instance()), "not json").unwrap();
        assert!(RunLock::acquire(dir.path(), &instance(), false).is_ok());
    }
}
