// ABOUTME: Drives a single resource from dispatch to Ready or Failed.
// ABOUTME: Apply with retry and backoff, poll readiness with a deadline, stop at safe checkpoints.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::phase::Phase;
use super::retry::RetryPolicy;
use super::state::{RunState, StateError};
use crate::control_plane::{ControlPlane, Readiness};
use crate::plan::ResourceSpec;

/// How a worker picks up its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Start {
    /// Just moved from Pending to Applying.
    Fresh,
    /// Left Applying or WaitingReady by an earlier run; look before applying.
    Recover,
}

/// Where a worker left its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    Ready,
    Failed,
    /// Stopped at a checkpoint after cancellation; state is resumable.
    Interrupted,
}

enum Wait {
    Ready,
    Failed(String),
    TimedOut,
    Cancelled,
}

pub(crate) struct Worker<C: ?Sized> {
    pub control_plane: Arc<C>,
    pub state: Arc<RunState>,
    pub retry: RetryPolicy,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: CancelToken,
}

impl<C: ControlPlane + ?Sized> Worker<C> {
    pub async fn converge(&self, spec: &ResourceSpec, start: Start) -> Result<Settled, StateError> {
        let id = &spec.id;
        let mut needs_apply = match start {
            Start::Fresh => true,
            Start::Recover => match self.recover(spec).await? {
                Some(needs_apply) => needs_apply,
                None => return Ok(Settled::Failed),
            },
        };
        let mut attempt = self.state.record(id).map(|r| r.attempts).unwrap_or(0);

        loop {
            if needs_apply {
                if self.cancel.is_cancelled() {
                    return Ok(Settled::Interrupted);
                }

                attempt = self.state.begin_attempt(id)?;
                info!(resource = %id, attempt, "Applying");

                match self.control_plane.apply(spec).await {
                    Ok(()) => self.state.transition(id, Phase::WaitingReady, None)?,
                    Err(err) if err.is_transient() => {
                        warn!(resource = %id, attempt, error = %err, "Apply failed, will retry");
                        if self.retry.exhausted(attempt) {
                            return self.fail(spec, exhausted_message(attempt, &err));
                        }
                        self.state.set_error(id, err.to_string())?;
                        if !self.back_off(spec, attempt).await {
                            return Ok(Settled::Interrupted);
                        }
                        continue;
                    }
                    Err(err) => {
                        warn!(resource = %id, attempt, error = %err, "Apply rejected");
                        return self.fail(spec, err.to_string());
                    }
                }
            }
            needs_apply = true;

            match self.await_ready(spec).await? {
                Wait::Ready => {
                    self.state.transition(id, Phase::Ready, None)?;
                    info!(resource = %id, attempt, "Ready");
                    return Ok(Settled::Ready);
                }
                Wait::Failed(message) => {
                    warn!(resource = %id, attempt, error = %message, "Resource failed");
                    return self.fail(spec, message);
                }
                Wait::Cancelled => return Ok(Settled::Interrupted),
                Wait::TimedOut => {
                    let message = format!(
                        "timed out after {:?} waiting for readiness",
                        self.ready_timeout
                    );
                    warn!(resource = %id, attempt, timeout = ?self.ready_timeout, "Readiness timeout");
                    if self.retry.exhausted(attempt) {
                        return self.fail(spec, exhausted_message(attempt, &message));
                    }
                    self.state.transition(id, Phase::Applying, Some(message))?;
                    if !self.back_off(spec, attempt).await {
                        return Ok(Settled::Interrupted);
                    }
                }
            }
        }
    }

    /// Inspect a resource an earlier run left mid-flight.
    ///
    /// Returns whether it still needs an apply, or None if it failed outright.
    async fn recover(&self, spec: &ResourceSpec) -> Result<Option<bool>, StateError> {
        let id = &spec.id;
        let phase = self.state.phase(id).unwrap_or(Phase::Applying);

        match self.control_plane.get_status(spec).await {
            Err(err) if err.is_not_found() => {
                info!(resource = %id, "Not present on the cluster, applying");
                if phase == Phase::WaitingReady {
                    self.state
                        .transition(id, Phase::Applying, Some("object missing on resume".into()))?;
                }
                Ok(Some(true))
            }
            Err(err) if !err.is_transient() => {
                self.fail(spec, err.to_string())?;
                Ok(None)
            }
            _ => {
                info!(resource = %id, "Present on the cluster, waiting for readiness");
                if phase == Phase::Applying {
                    self.state.transition(id, Phase::WaitingReady, None)?;
                }
                Ok(Some(false))
            }
        }
    }

    async fn await_ready(&self, spec: &ResourceSpec) -> Result<Wait, StateError> {
        let id = &spec.id;
        let deadline = Instant::now() + self.ready_timeout;

        loop {
            match self.control_plane.get_status(spec).await {
                Ok(signal) => {
                    let readiness = signal.readiness;
                    let message = signal.message.clone();
                    self.state.observe(id, signal)?;
                    match readiness {
                        Readiness::Ready => return Ok(Wait::Ready),
                        Readiness::Failed => {
                            return Ok(Wait::Failed(
                                message.unwrap_or_else(|| "reported failed".to_string()),
                            ));
                        }
                        Readiness::NotReady => {
                            debug!(resource = %id, message = ?message, "Not ready yet");
                        }
                    }
                }
                Err(err) if err.is_transient() => {
                    debug!(resource = %id, error = %err, "Status unavailable");
                }
                Err(err) => return Ok(Wait::Failed(err.to_string())),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Wait::TimedOut);
            }
            if !self.cancel.sleep(self.poll_interval.min(deadline - now)).await {
                return Ok(Wait::Cancelled);
            }
        }
    }

    /// Wait out the backoff after a failed attempt. False if cancelled meanwhile.
    async fn back_off(&self, spec: &ResourceSpec, attempt: u32) -> bool {
        let delay = self.retry.backoff(attempt);
        debug!(resource = %spec.id, attempt, ?delay, "Backing off");
        self.cancel.sleep(delay).await
    }

    fn fail(&self, spec: &ResourceSpec, message: String) -> Result<Settled, StateError> {
        self.state.transition(&spec.id, Phase::Failed, Some(message))?;
        Ok(Settled::Failed)
    }
}

fn exhausted_message(attempts: u32, last: &dyn std::fmt::Display) -> String {
    format!("gave up after {} attempts: {}", attempts, last)
}
