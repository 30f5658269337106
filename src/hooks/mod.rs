// ABOUTME: User hook scripts run around a bootstrap.
// ABOUTME: Discovered in .bootstrapper/hooks; run context is passed as BOOTSTRAPPER_* variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::engine::RunOutcome;
use crate::types::{ResourceName, RunId};

/// Longest a hook may run before it is killed.
const HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Points in a run where hooks are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before anything is applied. Failure aborts the run.
    PreBootstrap,
    /// After the run succeeded.
    PostBootstrap,
    /// After the run failed, rolled back or was cancelled.
    OnError,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreBootstrap => "pre-bootstrap",
            HookPoint::PostBootstrap => "post-bootstrap",
            HookPoint::OnError => "on-error",
        }
    }

    /// Whether failure at this point aborts the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreBootstrap)
    }

    /// Hook to run once a run has finished with `outcome`.
    pub fn after(outcome: RunOutcome) -> Self {
        if outcome.is_success() {
            HookPoint::PostBootstrap
        } else {
            HookPoint::OnError
        }
    }
}

#[derive(Debug, Clone)]
pub struct HookContext {
    pub instance: ResourceName,
    pub namespace: ResourceName,
    pub environment: Option<String>,
    pub run_id: RunId,
    pub fingerprint: String,
    pub outcome: Option<RunOutcome>,
}

impl HookContext {
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("BOOTSTRAPPER_INSTANCE".to_string(), self.instance.to_string());
        env.insert("BOOTSTRAPPER_NAMESPACE".to_string(), self.namespace.to_string());
        env.insert("BOOTSTRAPPER_RUN_ID".to_string(), self.run_id.to_string());
        env.insert("BOOTSTRAPPER_PLAN".to_string(), self.fingerprint.clone());
        if let Some(environment) = &self.environment {
            env.insert("BOOTSTRAPPER_ENVIRONMENT".to_string(), environment.clone());
        }
        if let Some(outcome) = self.outcome {
            env.insert("BOOTSTRAPPER_OUTCOME".to_string(), outcome.to_string());
        }
        env
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    fn failed(stderr: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr,
        }
    }
}

/// Discovers and runs hooks from a project directory.
pub struct HookRunner {
    project_dir: PathBuf,
    hooks_dir: PathBuf,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            hooks_dir: project_dir.join(".bootstrapper").join("hooks"),
            timeout: HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run the hook for `point` if one exists, from the project directory.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);
        if !hook_path.is_file() {
            return None;
        }

        tracing::info!("Running {} hook: {}", point.filename(), hook_path.display());

        let child = Command::new(&hook_path)
            .current_dir(&self.project_dir)
            .envs(context.to_env())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => HookResult {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Ok(Err(e)) => {
                tracing::error!("Failed to execute {} hook: {}", point.filename(), e);
                HookResult::failed(e.to_string())
            }
            Err(_) => {
                tracing::error!("{} hook timed out after {:?}", point.filename(), self.timeout);
                HookResult::failed(format!("timed out after {:?}", self.timeout))
            }
        };

        if result.success {
            tracing::info!("{} hook completed successfully", point.filename());
        } else {
            tracing::warn!(
                "{} hook failed with exit code {:?}",
                point.filename(),
                result.exit_code
            );
        }
        Some(result)
    }
}
