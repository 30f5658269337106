// ABOUTME: Resource plan: the ordered, acyclic set of specs a bootstrap converges.
// ABOUTME: Exposes DesiredState, the plan builder, and plan-level queries.

mod builder;
mod desired;
mod error;
mod graph;
mod spec;

pub use builder::{MANAGED_BY, build_plan};
pub use desired::{
    DatabaseSpec, DependentService, DesiredState, IngressRoute, IngressSpec, ObjectStorageSpec,
    ServiceSpec, Sizing,
};
pub use error::PlanError;
pub use spec::{
    EnvSource, IngressPayload, IngressRule, JobPayload, ResourceKind, ResourcePayload,
    ResourceSpec, SecretValue, ServicePort, VolumeClaim, Workload,
};

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::types::ResourceId;

/// Specs in a dependency-respecting order.
#[derive(Debug, Clone)]
pub struct Plan {
    specs: Vec<ResourceSpec>,
    index: HashMap<ResourceId, usize>,
}

impl Plan {
    /// Validate and order an arbitrary set of specs.
    ///
    /// Fails on duplicate identifiers, references to unknown specs, and cycles.
    pub fn new(specs: Vec<ResourceSpec>) -> Result<Self, PlanError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(&spec.id) {
                return Err(PlanError::DuplicateResource(spec.id.to_string()));
            }
        }

        let order = graph::topological_order(&specs)?;
        let mut slots: Vec<Option<ResourceSpec>> = specs.into_iter().map(Some).collect();
        let specs: Vec<ResourceSpec> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        Ok(Self { specs, index })
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.index.get(id).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Position of a spec in plan order; dependencies always sort lower.
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Teardown order: dependents before their dependencies.
    pub fn reverse_order(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter().rev()
    }

    /// Stable digest of the plan's identifiers, ordering and payloads.
    ///
    /// Secret values are redacted during serialization, so rotating a password
    /// does not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in &self.specs {
            // Serializing plain data structures cannot fail.
            if let Ok(bytes) = serde_json::to_vec(spec) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}
