// ABOUTME: Persists run snapshots so interrupted runs can resume and `status` can report.
// ABOUTME: JSON files under the state directory, written atomically via rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::engine::RunSnapshot;
use crate::types::ResourceName;

/// Directory name under the platform state directory.
const APP_DIR: &str = "bootstrapper";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run store {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt run snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Default state directory: `$XDG_STATE_HOME/bootstrapper`, falling back to
/// the local data directory, then `.bootstrapper/state` in the working directory.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".bootstrapper").join("state"))
}

#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the current snapshot for `instance`.
    pub fn snapshot_path(&self, instance: &ResourceName) -> PathBuf {
        self.dir.join(format!("{}.run.json", instance))
    }

    fn archive_dir(&self, instance: &ResourceName) -> PathBuf {
        self.dir.join("runs").join(instance.as_str())
    }

    /// Replace the current snapshot for `instance`.
    pub fn save(&self, instance: &ResourceName, snapshot: &RunSnapshot) -> Result<(), StoreError> {
        write_atomic(&self.snapshot_path(instance), snapshot)
    }

    /// `save` on the blocking pool, for callers on an async task.
    pub async fn save_async(
        &self,
        instance: &ResourceName,
        snapshot: RunSnapshot,
    ) -> Result<(), StoreError> {
        let path = self.snapshot_path(instance);
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &snapshot))
            .await
            .map_err(|e| StoreError::Io {
                path,
                source: std::io::Error::other(e),
            })?
    }

    /// Load the current snapshot, if any run was recorded.
    pub fn load(&self, instance: &ResourceName) -> Result<Option<RunSnapshot>, StoreError> {
        let path = self.snapshot_path(instance);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Keep a finished run under `runs/<instance>/<run-id>.json`.
    pub fn archive(&self, instance: &ResourceName, snapshot: &RunSnapshot) -> Result<PathBuf, StoreError> {
        let path = self
            .archive_dir(instance)
            .join(format!("{}.json", snapshot.run_id));
        write_atomic(&path, snapshot)?;
        Ok(path)
    }

    /// Archived run ids for `instance`, oldest first.
    pub fn archived_runs(&self, instance: &ResourceName) -> Result<Vec<String>, StoreError> {
        let dir = self.archive_dir(instance);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut runs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        // Run ids embed a sortable timestamp.
        runs.sort();
        Ok(runs)
    }

    /// Forget the current snapshot (after a successful teardown).
    pub fn clear(&self, instance: &ResourceName) -> Result<(), StoreError> {
        let path = self.snapshot_path(instance);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn write_atomic(path: &Path, snapshot: &RunSnapshot) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
