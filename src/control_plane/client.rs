// ABOUTME: The ControlPlane trait the convergence engine drives.
// ABOUTME: Apply, status and delete for a single resource spec; health reported as HealthSignal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ControlPlaneError;
use crate::plan::ResourceSpec;

/// Coarse readiness of an object as observed on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
    /// The object reached a state it will not recover from without a new apply.
    Failed,
}

/// Observed health of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub readiness: Readiness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Retries the control plane itself reports (failed job pods, for instance).
    #[serde(default)]
    pub retries: u32,
    pub observed_at: DateTime<Utc>,
}

impl HealthSignal {
    pub fn ready() -> Self {
        Self::with(Readiness::Ready, None)
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::with(Readiness::NotReady, Some(message.into()))
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with(Readiness::Failed, Some(message.into()))
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    fn with(readiness: Readiness, message: Option<String>) -> Self {
        Self {
            readiness,
            message,
            retries: 0,
            observed_at: Utc::now(),
        }
    }
}

/// Operations against the cluster control plane.
///
/// All calls are idempotent: applying an unchanged spec twice is a no-op on the
/// cluster, and deleting an absent object reports `NotFound`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create or update the object described by `spec`.
    async fn apply(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError>;

    /// Observe the object's health. Absent objects report `NotFound`.
    async fn get_status(&self, spec: &ResourceSpec) -> Result<HealthSignal, ControlPlaneError>;

    /// Remove the object.
    async fn delete(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError>;
}

#[async_trait]
impl<T: ControlPlane + ?Sized> ControlPlane for Arc<T> {
    async fn apply(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        (**self).apply(spec).await
    }

    async fn get_status(&self, spec: &ResourceSpec) -> Result<HealthSignal, ControlPlaneError> {
        (**self).get_status(spec).await
    }

    async fn delete(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        (**self).delete(spec).await
    }
}
