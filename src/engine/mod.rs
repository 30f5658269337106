// ABOUTME: Convergence engine: drives the cluster toward a resource plan.
// ABOUTME: Per-resource state machine, retry policy, cancellation, rollback and teardown.

mod cancel;
pub mod events;
mod outcome;
mod phase;
mod retry;
mod scheduler;
mod state;
mod teardown;
mod worker;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use events::{EventReceiver, EventSender, ProgressEvent};
pub use outcome::{BlockedByDependencyFailure, ResourceReport, RunOutcome, RunReport};
pub use phase::Phase;
pub use retry::RetryPolicy;
pub use scheduler::{Engine, RunOptions};
pub use state::{ResourceRecord, RunSnapshot, RunState, StateError, Transition};
pub use teardown::{Deletion, TeardownReport, delete_with_retry, teardown};
