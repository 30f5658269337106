// ABOUTME: RunState: per-resource phase records with append-only transition history.
// ABOUTME: One lock per resource; snapshots serialize the whole run for resume and status.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::events::{EventSender, ProgressEvent};
use super::outcome::RunOutcome;
use super::phase::Phase;
use crate::control_plane::HealthSignal;
use crate::plan::Plan;
use crate::types::{ResourceId, RunId};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("resource '{0}' is not part of this run")]
    UnknownResource(ResourceId),

    #[error("illegal transition for '{id}': {from} -> {to}")]
    IllegalTransition { id: ResourceId, from: Phase, to: Phase },

    #[error("snapshot was taken for a different plan (fingerprint {found}, current plan {expected})")]
    FingerprintMismatch { expected: String, found: String },

    #[error("snapshot has no record for '{0}'")]
    MissingRecord(ResourceId),
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub phase: Phase,
    /// Apply attempts made in the current convergence of this resource.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signal: Option<HealthSignal>,
    #[serde(default)]
    pub history: Vec<Transition>,
}

impl ResourceRecord {
    fn pending() -> Self {
        Self {
            phase: Phase::Pending,
            attempts: 0,
            last_error: None,
            last_signal: None,
            history: Vec::new(),
        }
    }

    /// Whether this resource failed, including when rollback has since deleted it.
    pub fn has_failed(&self) -> bool {
        match self.phase {
            Phase::Failed => true,
            Phase::RolledBack => self
                .history
                .last()
                .is_some_and(|t| t.to == Phase::RolledBack && t.from == Phase::Failed),
            _ => false,
        }
    }
}

/// Serializable image of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub fingerprint: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    pub resources: BTreeMap<ResourceId, ResourceRecord>,
}

impl RunSnapshot {
    pub fn phase_of(&self, id: &ResourceId) -> Option<Phase> {
        self.resources.get(id).map(|r| r.phase)
    }

    /// Count resources per phase.
    pub fn tally(&self) -> BTreeMap<Phase, usize> {
        let mut tally = BTreeMap::new();
        for record in self.resources.values() {
            *tally.entry(record.phase).or_insert(0) += 1;
        }
        tally
    }
}

/// Live progress of one run.
///
/// The set of resources is fixed at construction; each record sits behind its
/// own lock so workers converging different resources never contend.
#[derive(Debug)]
pub struct RunState {
    run_id: RunId,
    fingerprint: String,
    started_at: DateTime<Utc>,
    records: BTreeMap<ResourceId, Mutex<ResourceRecord>>,
    finished: Mutex<Option<(DateTime<Utc>, RunOutcome)>>,
    events: Option<EventSender>,
}

impl RunState {
    /// Fresh state with every plan resource Pending.
    pub fn new(run_id: RunId, plan: &Plan) -> Self {
        let records = plan
            .specs()
            .iter()
            .map(|spec| (spec.id.clone(), Mutex::new(ResourceRecord::pending())))
            .collect();
        Self {
            run_id,
            fingerprint: plan.fingerprint(),
            started_at: Utc::now(),
            records,
            finished: Mutex::new(None),
            events: None,
        }
    }

    /// Rebuild state from a snapshot of an earlier run of the same plan.
    ///
    /// Ready resources stay Ready. Failed and rolled-back resources are reset
    /// to Pending with a fresh attempt budget; the reset is kept in history.
    pub fn resume(snapshot: RunSnapshot, plan: &Plan) -> Result<Self, StateError> {
        let expected = plan.fingerprint();
        if snapshot.fingerprint != expected {
            return Err(StateError::FingerprintMismatch {
                expected,
                found: snapshot.fingerprint,
            });
        }

        let mut resources = snapshot.resources;
        let mut records = BTreeMap::new();
        for spec in plan.specs() {
            let mut record = resources
                .remove(&spec.id)
                .ok_or_else(|| StateError::MissingRecord(spec.id.clone()))?;

            if matches!(record.phase, Phase::Failed | Phase::RolledBack) {
                record.history.push(Transition {
                    from: record.phase,
                    to: Phase::Pending,
                    at: Utc::now(),
                    attempt: record.attempts,
                    error: None,
                });
                record.phase = Phase::Pending;
                record.attempts = 0;
                record.last_error = None;
            }
            records.insert(spec.id.clone(), Mutex::new(record));
        }

        Ok(Self {
            run_id: snapshot.run_id,
            fingerprint: expected,
            started_at: snapshot.started_at,
            records,
            finished: Mutex::new(None),
            events: None,
        })
    }

    /// Send a ProgressEvent for every subsequent transition.
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn slot(&self, id: &ResourceId) -> Result<&Mutex<ResourceRecord>, StateError> {
        self.records
            .get(id)
            .ok_or_else(|| StateError::UnknownResource(id.clone()))
    }

    pub fn phase(&self, id: &ResourceId) -> Option<Phase> {
        self.records.get(id).map(|r| r.lock().phase)
    }

    pub fn record(&self, id: &ResourceId) -> Option<ResourceRecord> {
        self.records.get(id).map(|r| r.lock().clone())
    }

    pub fn all_in(&self, phase: Phase) -> bool {
        self.records.values().all(|r| r.lock().phase == phase)
    }

    /// Move `id` to `to`, recording history and emitting a progress event.
    pub fn transition(
        &self,
        id: &ResourceId,
        to: Phase,
        error: Option<String>,
    ) -> Result<(), StateError> {
        let mut record = self.slot(id)?.lock();
        let from = record.phase;
        if !from.can_transition_to(to) {
            return Err(StateError::IllegalTransition {
                id: id.clone(),
                from,
                to,
            });
        }

        let at = Utc::now();
        let attempt = record.attempts;
        record.phase = to;
        if error.is_some() {
            record.last_error = error.clone();
        }
        record.history.push(Transition {
            from,
            to,
            at,
            attempt,
            error: error.clone(),
        });

        // Sent while holding the lock so events for one resource stay ordered.
        if let Some(events) = &self.events {
            let _ = events.send(ProgressEvent {
                resource_id: id.clone(),
                from,
                phase: to,
                timestamp: at,
                error,
                attempt,
            });
        }
        Ok(())
    }

    /// Count a new apply attempt and return its 1-based number.
    pub fn begin_attempt(&self, id: &ResourceId) -> Result<u32, StateError> {
        let mut record = self.slot(id)?.lock();
        record.attempts += 1;
        Ok(record.attempts)
    }

    pub fn set_error(&self, id: &ResourceId, error: impl Into<String>) -> Result<(), StateError> {
        self.slot(id)?.lock().last_error = Some(error.into());
        Ok(())
    }

    pub fn observe(&self, id: &ResourceId, signal: HealthSignal) -> Result<(), StateError> {
        self.slot(id)?.lock().last_signal = Some(signal);
        Ok(())
    }

    pub(crate) fn finish(&self, outcome: RunOutcome) {
        *self.finished.lock() = Some((Utc::now(), outcome));
    }

    /// Consistent-per-resource copy of the whole run.
    pub fn snapshot(&self) -> RunSnapshot {
        let finished = *self.finished.lock();
        RunSnapshot {
            run_id: self.run_id.clone(),
            fingerprint: self.fingerprint.clone(),
            started_at: self.started_at,
            finished_at: finished.map(|(at, _)| at),
            outcome: finished.map(|(_, outcome)| outcome),
            resources: self
                .records
                .iter()
                .map(|(id, record)| (id.clone(), record.lock().clone()))
                .collect(),
        }
    }
}
