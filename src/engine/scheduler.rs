// ABOUTME: The convergence engine: bounded worker pool over the plan's dependency frontier.
// ABOUTME: Dispatches eligible resources, settles the run outcome, and rolls back when asked.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::cancel::{CancelHandle, CancelToken, cancel_pair};
use super::outcome::{RunOutcome, RunReport};
use super::phase::Phase;
use super::state::{RunState, StateError};
use super::teardown::{self, TeardownReport, delete_with_retry};
use super::worker::{Settled, Start, Worker};
use crate::config::EngineConfig;
use crate::control_plane::ControlPlane;
use crate::plan::{Plan, ResourceSpec};
use crate::types::ResourceId;

/// What to do when a run cannot succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Tear down created resources after a failure.
    pub rollback_on_failure: bool,
    /// Tear down created resources after cancellation instead of leaving them resumable.
    pub rollback_on_cancel: bool,
}

type TaskResult = (ResourceId, Result<Settled, StateError>);

pub struct Engine<C: ?Sized> {
    control_plane: Arc<C>,
    config: EngineConfig,
    cancel: CancelHandle,
    token: CancelToken,
}

impl<C: ControlPlane + ?Sized + 'static> Engine<C> {
    pub fn new(control_plane: Arc<C>, config: EngineConfig) -> Self {
        let (cancel, token) = cancel_pair();
        Self {
            control_plane,
            config,
            cancel,
            token,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle for cancelling runs of this engine from another task.
    ///
    /// Cancellation is sticky: once requested, this run and every later `run`
    /// on the same engine stop before dispatching. Build a new `Engine` for the
    /// next attempt. `teardown` ignores cancellation.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Converge `plan`, recording progress in `state`.
    pub async fn run(&self, plan: &Plan, state: Arc<RunState>, options: RunOptions) -> RunReport {
        let cancelled = match self.drive(plan, &state).await {
            Ok(cancelled) => cancelled,
            Err(err) => {
                error!(error = %err, "Run state rejected an update, aborting");
                false
            }
        };

        let outcome = if state.all_in(Phase::Ready) {
            RunOutcome::Succeeded
        } else if cancelled {
            if options.rollback_on_cancel {
                self.rollback(plan, &state).await
            } else {
                info!("Run cancelled; state is resumable");
                RunOutcome::Cancelled
            }
        } else if options.rollback_on_failure {
            self.rollback(plan, &state).await
        } else {
            RunOutcome::Failed
        };

        state.finish(outcome);
        info!(%outcome, "Run finished");
        RunReport::new(plan, &state.snapshot(), outcome)
    }

    /// Delete every resource of `plan` regardless of run state.
    pub async fn teardown(&self, plan: &Plan) -> TeardownReport {
        teardown::teardown(self.control_plane.as_ref(), plan, &self.config.retry).await
    }

    /// Dispatch until nothing is running and nothing else can start.
    ///
    /// Returns whether the run was cancelled.
    async fn drive(&self, plan: &Plan, state: &Arc<RunState>) -> Result<bool, StateError> {
        let limit = self.config.max_in_flight.max(1);
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut recovering: VecDeque<ResourceSpec> = plan
            .specs()
            .iter()
            .filter(|spec| state.phase(&spec.id).is_some_and(Phase::is_in_flight))
            .cloned()
            .collect();
        let mut cancelled = self.token.is_cancelled();

        info!(
            resources = plan.len(),
            recovering = recovering.len(),
            max_in_flight = limit,
            "Starting convergence"
        );

        loop {
            while !cancelled && tasks.len() < limit {
                let next = match recovering.pop_front() {
                    Some(spec) => Some((spec, Start::Recover)),
                    None => next_eligible(plan, state)?.map(|spec| (spec, Start::Fresh)),
                };
                let Some((spec, start)) = next else {
                    break;
                };
                self.spawn(&mut tasks, state, spec, start);
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((id, Ok(settled)))) => {
                        tracing::debug!(resource = %id, ?settled, "Worker finished");
                    }
                    Some(Ok((id, Err(err)))) => {
                        error!(resource = %id, error = %err, "Worker aborted");
                    }
                    Some(Err(err)) => error!(error = %err, "Worker task panicked"),
                    None => {}
                },
                _ = self.token.cancelled(), if !cancelled => {
                    cancelled = true;
                    warn!(in_flight = tasks.len(), "Cancellation requested, letting in-flight resources settle");
                }
            }
        }

        Ok(cancelled)
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        state: &Arc<RunState>,
        spec: ResourceSpec,
        start: Start,
    ) {
        let worker = Worker {
            control_plane: Arc::clone(&self.control_plane),
            state: Arc::clone(state),
            retry: self.config.retry.clone(),
            ready_timeout: self.config.ready_timeout,
            poll_interval: self.config.poll_interval,
            cancel: self.token.clone(),
        };
        tasks.spawn(async move {
            let result = worker.converge(&spec, start).await;
            (spec.id, result)
        });
    }

    /// Delete everything that may exist, dependents first.
    async fn rollback(&self, plan: &Plan, state: &RunState) -> RunOutcome {
        warn!("Rolling back");
        for spec in plan.reverse_order() {
            let Some(phase) = state.phase(&spec.id) else {
                continue;
            };
            if !phase.may_exist() {
                continue;
            }

            match delete_with_retry(self.control_plane.as_ref(), spec, &self.config.retry).await {
                Ok(_) => {
                    if let Err(err) = state.transition(&spec.id, Phase::RolledBack, None) {
                        error!(error = %err, "Could not record rollback");
                        return RunOutcome::Failed;
                    }
                }
                Err(err) => {
                    error!(resource = %spec.id, error = %err, "Rollback failed");
                    let _ = state.set_error(&spec.id, format!("rollback failed: {}", err));
                    return RunOutcome::Failed;
                }
            }
        }
        RunOutcome::RolledBack
    }
}

/// First Pending spec, in plan order, whose dependencies are all Ready; marked Applying.
fn next_eligible(plan: &Plan, state: &RunState) -> Result<Option<ResourceSpec>, StateError> {
    let eligible = plan.specs().iter().find(|spec| {
        state.phase(&spec.id) == Some(Phase::Pending)
            && spec
                .depends_on
                .iter()
                .all(|dep| state.phase(dep) == Some(Phase::Ready))
    });

    match eligible {
        Some(spec) => {
            state.transition(&spec.id, Phase::Applying, None)?;
            Ok(Some(spec.clone()))
        }
        None => Ok(None),
    }
}
