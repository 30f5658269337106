// ABOUTME: Lifecycle phases of a resource within a run and the legal transitions between them.
// ABOUTME: Every phase change in RunState is checked against this table.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not yet started; dependencies may still be converging.
    Pending,
    /// An apply has been issued or is waiting out a retry backoff.
    Applying,
    /// Apply accepted; polling until the resource reports ready.
    WaitingReady,
    Ready,
    Failed,
    /// Deleted during rollback.
    RolledBack,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Applying => "applying",
            Phase::WaitingReady => "waiting_ready",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
            Phase::RolledBack => "rolled_back",
        }
    }

    /// Whether a run may move a resource from `self` to `next`.
    ///
    /// `Failed`/`RolledBack` to `Pending` is only taken when a run is resumed.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, Applying)
                | (Applying, WaitingReady)
                | (Applying, Failed)
                | (Applying, RolledBack)
                | (WaitingReady, Ready)
                | (WaitingReady, Failed)
                | (WaitingReady, Applying)
                | (WaitingReady, RolledBack)
                | (Ready, RolledBack)
                | (Failed, RolledBack)
                | (Failed, Pending)
                | (RolledBack, Pending)
        )
    }

    /// Whether an object for this resource may exist on the cluster.
    pub fn may_exist(self) -> bool {
        !matches!(self, Phase::Pending | Phase::RolledBack)
    }

    /// Whether the resource was in the middle of converging.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::Applying | Phase::WaitingReady)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
