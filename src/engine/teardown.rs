// ABOUTME: Deleting plan resources in reverse dependency order.
// ABOUTME: Shared by rollback and the `down` command; NotFound counts as already deleted.

use serde::Serialize;
use tracing::{info, warn};

use super::retry::RetryPolicy;
use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::plan::{Plan, ResourceSpec};
use crate::types::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// Nothing to delete.
    Absent,
}

/// Delete one resource, retrying transient errors under `retry`.
pub async fn delete_with_retry<C: ControlPlane + ?Sized>(
    control_plane: &C,
    spec: &ResourceSpec,
    retry: &RetryPolicy,
) -> Result<Deletion, ControlPlaneError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match control_plane.delete(spec).await {
            Ok(()) => {
                info!(resource = %spec.id, "Deleted");
                return Ok(Deletion::Deleted);
            }
            Err(err) if err.is_not_found() => return Ok(Deletion::Absent),
            Err(err) if err.is_transient() && !retry.exhausted(attempt) => {
                warn!(resource = %spec.id, attempt, error = %err, "Delete failed, will retry");
                tokio::time::sleep(retry.backoff(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TeardownReport {
    pub deleted: Vec<ResourceId>,
    pub absent: Vec<ResourceId>,
    pub failed: Vec<(ResourceId, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every plan resource, dependents first, whatever state the last run left.
///
/// Keeps going past failures so one stuck object does not strand the rest.
pub async fn teardown<C: ControlPlane + ?Sized>(
    control_plane: &C,
    plan: &Plan,
    retry: &RetryPolicy,
) -> TeardownReport {
    let mut report = TeardownReport::default();
    for spec in plan.reverse_order() {
        match delete_with_retry(control_plane, spec, retry).await {
            Ok(Deletion::Deleted) => report.deleted.push(spec.id.clone()),
            Ok(Deletion::Absent) => report.absent.push(spec.id.clone()),
            Err(err) => {
                warn!(resource = %spec.id, error = %err, "Could not delete");
                report.failed.push((spec.id.clone(), err.to_string()));
            }
        }
    }
    report
}
