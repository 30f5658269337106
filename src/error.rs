// ABOUTME: Application-wide error types for bootstrapper.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::control_plane::ConnectError;
use crate::engine::{RunOutcome, StateError};
use crate::lock::LockError;
use crate::plan::PlanError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot resume: {0}")]
    State(#[from] StateError),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("no previous run recorded for instance {0}")]
    NoRunRecorded(String),

    #[error("bootstrap finished with outcome {0}")]
    RunUnsuccessful(RunOutcome),

    #[error("teardown left {0} resource(s) behind")]
    TeardownIncomplete(usize),

    #[error("interrupted; run state saved, continue with `up --resume`")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // 128 + SIGINT, as shells report a Ctrl-C'd command.
            Error::Interrupted => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_exits_like_sigint() {
        assert_eq!(Error::Interrupted.exit_code(), 130);
        assert_eq!(Error::NoRunRecorded("chat".into()).exit_code(), 1);
    }
}
