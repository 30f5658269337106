// ABOUTME: Final run outcome and the per-resource report surfaced to the user.
// ABOUTME: Pending resources behind a failed dependency are reported as blocked.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use super::phase::Phase;
use super::state::RunSnapshot;
use crate::plan::Plan;
use crate::types::{ResourceId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    RolledBack,
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => f.write_str("succeeded"),
            RunOutcome::Failed => f.write_str("failed"),
            RunOutcome::RolledBack => f.write_str("rolled back"),
            RunOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A resource that never started because a dependency failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedByDependencyFailure {
    /// Failed resources upstream of this one.
    pub failed_dependencies: Vec<ResourceId>,
}

impl fmt::Display for BlockedByDependencyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.failed_dependencies.iter().map(|id| id.as_str()).collect();
        write!(f, "blocked by failed dependency {}", names.join(", "))
    }
}

/// State of a resource that did not end up Ready.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    pub phase: Phase,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockedByDependencyFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub ready: usize,
    pub total: usize,
    /// Every resource not Ready, in plan order.
    pub unfinished: Vec<ResourceReport>,
}

impl RunReport {
    pub fn new(plan: &Plan, snapshot: &RunSnapshot, outcome: RunOutcome) -> Self {
        let blocked = blocked_resources(plan, snapshot);

        let mut ready = 0;
        let mut unfinished = Vec::new();
        for spec in plan.specs() {
            let Some(record) = snapshot.resources.get(&spec.id) else {
                continue;
            };
            if record.phase == Phase::Ready {
                ready += 1;
                continue;
            }
            unfinished.push(ResourceReport {
                id: spec.id.clone(),
                phase: record.phase,
                attempts: record.attempts,
                last_error: record.last_error.clone(),
                blocked: blocked.get(&spec.id).map(|failed| BlockedByDependencyFailure {
                    failed_dependencies: failed.iter().cloned().collect(),
                }),
            });
        }

        Self {
            run_id: snapshot.run_id.clone(),
            outcome,
            ready,
            total: plan.len(),
            unfinished,
        }
    }

    pub fn blocked(&self) -> impl Iterator<Item = &ResourceReport> {
        self.unfinished.iter().filter(|r| r.blocked.is_some())
    }
}

/// Pending resources with a failed resource somewhere upstream, mapped to those failures.
///
/// A dependency rolled back after failing still counts as failed.
fn blocked_resources(
    plan: &Plan,
    snapshot: &RunSnapshot,
) -> HashMap<ResourceId, BTreeSet<ResourceId>> {
    let mut upstream: HashMap<ResourceId, BTreeSet<ResourceId>> = HashMap::new();

    // Plan order guarantees dependencies are visited first.
    for spec in plan.specs() {
        let mut failed = BTreeSet::new();
        for dep in &spec.depends_on {
            if snapshot.resources.get(dep).is_some_and(|r| r.has_failed()) {
                failed.insert(dep.clone());
            }
            if let Some(inherited) = upstream.get(dep) {
                failed.extend(inherited.iter().cloned());
            }
        }
        if !failed.is_empty() {
            upstream.insert(spec.id.clone(), failed);
        }
    }

    upstream.retain(|id, _| snapshot.phase_of(id) == Some(Phase::Pending));
    upstream
}
