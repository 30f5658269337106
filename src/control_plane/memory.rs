// ABOUTME: In-memory ControlPlane with scriptable failures and readiness sequences.
// ABOUTME: Backs dry runs and the engine test-suite; records every call it receives.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use super::client::{ControlPlane, HealthSignal};
use super::error::ControlPlaneError;
use crate::plan::ResourceSpec;
use crate::types::ResourceId;

/// Operation recorded by MemoryControlPlane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    GetStatus,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub operation: Operation,
    pub resource: ResourceId,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Script {
    apply_errors: VecDeque<ControlPlaneError>,
    apply_always: Option<ControlPlaneError>,
    statuses: VecDeque<HealthSignal>,
    status_errors: VecDeque<ControlPlaneError>,
    never_ready: bool,
    delete_errors: VecDeque<ControlPlaneError>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeSet<ResourceId>,
    scripts: HashMap<ResourceId, Script>,
    calls: Vec<Call>,
}

/// A control plane that lives in process memory.
///
/// Objects become ready as soon as they are applied unless a script says otherwise.
#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    inner: Mutex<Inner>,
    latency: Duration,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (observable under paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next applies of `id` with `errors`, in order, then succeed.
    pub fn fail_apply(&self, id: &ResourceId, errors: impl IntoIterator<Item = ControlPlaneError>) {
        let mut inner = self.inner.lock();
        inner
            .scripts
            .entry(id.clone())
            .or_default()
            .apply_errors
            .extend(errors);
    }

    /// Fail every apply of `id` with `error`.
    pub fn always_fail_apply(&self, id: &ResourceId, error: ControlPlaneError) {
        self.inner.lock().scripts.entry(id.clone()).or_default().apply_always = Some(error);
    }

    /// Report these signals on successive status polls, then ready.
    pub fn report_status(&self, id: &ResourceId, signals: impl IntoIterator<Item = HealthSignal>) {
        let mut inner = self.inner.lock();
        inner
            .scripts
            .entry(id.clone())
            .or_default()
            .statuses
            .extend(signals);
    }

    /// Fail the next status polls of `id` with `errors`.
    pub fn fail_status(&self, id: &ResourceId, errors: impl IntoIterator<Item = ControlPlaneError>) {
        let mut inner = self.inner.lock();
        inner
            .scripts
            .entry(id.clone())
            .or_default()
            .status_errors
            .extend(errors);
    }

    /// Report `id` as not ready forever.
    pub fn never_ready(&self, id: &ResourceId) {
        self.inner.lock().scripts.entry(id.clone()).or_default().never_ready = true;
    }

    /// Fail the next deletes of `id` with `errors`.
    pub fn fail_delete(&self, id: &ResourceId, errors: impl IntoIterator<Item = ControlPlaneError>) {
        let mut inner = self.inner.lock();
        inner
            .scripts
            .entry(id.clone())
            .or_default()
            .delete_errors
            .extend(errors);
    }

    /// Pretend `id` already exists, as if applied by an earlier run.
    pub fn seed(&self, id: &ResourceId) {
        self.inner.lock().objects.insert(id.clone());
    }

    pub fn exists(&self, id: &ResourceId) -> bool {
        self.inner.lock().objects.contains(id)
    }

    /// Identifiers of every object currently present.
    pub fn objects(&self) -> Vec<ResourceId> {
        self.inner.lock().objects.iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, operation: Operation, id: &ResourceId) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation && &c.resource == id)
            .count()
    }

    /// Resources in the order their first apply arrived.
    pub fn apply_order(&self) -> Vec<ResourceId> {
        let inner = self.inner.lock();
        let mut seen = BTreeSet::new();
        inner
            .calls
            .iter()
            .filter(|c| c.operation == Operation::Apply)
            .filter(|c| seen.insert(c.resource.clone()))
            .map(|c| c.resource.clone())
            .collect()
    }

    fn record(&self, operation: Operation, id: &ResourceId) {
        self.inner.lock().calls.push(Call {
            operation,
            resource: id.clone(),
            at: Instant::now(),
        });
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn apply(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        self.record(Operation::Apply, &spec.id);
        self.delay().await;

        let mut inner = self.inner.lock();
        if let Some(script) = inner.scripts.get_mut(&spec.id) {
            if let Some(err) = &script.apply_always {
                return Err(err.clone());
            }
            if let Some(err) = script.apply_errors.pop_front() {
                return Err(err);
            }
        }
        inner.objects.insert(spec.id.clone());
        Ok(())
    }

    async fn get_status(&self, spec: &ResourceSpec) -> Result<HealthSignal, ControlPlaneError> {
        self.record(Operation::GetStatus, &spec.id);
        self.delay().await;

        let mut inner = self.inner.lock();
        if let Some(script) = inner.scripts.get_mut(&spec.id)
            && let Some(err) = script.status_errors.pop_front()
        {
            return Err(err);
        }
        if !inner.objects.contains(&spec.id) {
            return Err(ControlPlaneError::NotFound(spec.id.to_string()));
        }

        let Some(script) = inner.scripts.get_mut(&spec.id) else {
            return Ok(HealthSignal::ready());
        };
        if script.never_ready {
            return Ok(HealthSignal::not_ready("never becomes ready"));
        }
        Ok(script
            .statuses
            .pop_front()
            .unwrap_or_else(HealthSignal::ready))
    }

    async fn delete(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        self.record(Operation::Delete, &spec.id);
        self.delay().await;

        let mut inner = self.inner.lock();
        if let Some(script) = inner.scripts.get_mut(&spec.id)
            && let Some(err) = script.delete_errors.pop_front()
        {
            return Err(err);
        }
        if inner.objects.remove(&spec.id) {
            Ok(())
        } else {
            Err(ControlPlaneError::NotFound(spec.id.to_string()))
        }
    }
}
