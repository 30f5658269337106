// ABOUTME: Integration tests for the convergence engine against the in-memory control plane.
// ABOUTME: Covers ordering, retry budgets, backoff timing, readiness timeouts and rollback.

mod support;

use bootstrapper::control_plane::{ControlPlaneError, HealthSignal, MemoryControlPlane, Operation};
use bootstrapper::engine::{Engine, Phase, RunOptions, RunOutcome, RunState, events};
use bootstrapper::plan::Plan;
use bootstrapper::types::RunId;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use support::{chain, config_map, drain, engine_config, init_tracing, namespace};

fn transient() -> ControlPlaneError {
    ControlPlaneError::Unavailable("apiserver restarting".into())
}

fn state(plan: &Plan) -> Arc<RunState> {
    Arc::new(RunState::new(RunId::new("run-test"), plan))
}

#[tokio::test(start_paused = true)]
async fn dependency_is_ready_before_dependent_starts() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new().with_latency(Duration::from_millis(200)));
    let (tx, mut rx) = events::channel();
    let state = Arc::new(RunState::new(RunId::new("run-test"), &plan).with_events(tx));

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(report.ready, 2);
    assert!(report.unfinished.is_empty());
    assert_eq!(cp.apply_order(), vec![a.clone(), b.clone()]);

    let events = drain(&mut rx);
    let a_ready = events
        .iter()
        .position(|e| e.resource_id == a && e.phase == Phase::Ready)
        .unwrap();
    let b_applying = events
        .iter()
        .position(|e| e.resource_id == b && e.phase == Phase::Applying)
        .unwrap();
    assert!(a_ready < b_applying);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_fails_run_and_keeps_ready_dependency() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&b, ControlPlaneError::Invalid("bad data key".into()));
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(state.phase(&a), Some(Phase::Ready));
    assert_eq!(state.phase(&b), Some(Phase::Failed));
    // Terminal errors are not retried.
    assert_eq!(cp.count(Operation::Apply, &b), 1);
    assert!(cp.exists(&a));

    let failed = &report.unfinished[0];
    assert_eq!(failed.id, b);
    assert!(failed.last_error.as_deref().unwrap().contains("bad data key"));
}

#[tokio::test(start_paused = true)]
async fn rollback_deletes_ready_dependency() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&b, ControlPlaneError::Forbidden("no rbac".into()));
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let options = RunOptions {
        rollback_on_failure: true,
        rollback_on_cancel: false,
    };
    let report = engine.run(&plan, state.clone(), options).await;

    assert_eq!(report.outcome, RunOutcome::RolledBack);
    assert!(!cp.exists(&a));
    assert_eq!(state.phase(&a), Some(Phase::RolledBack));
    assert_eq!(state.phase(&b), Some(Phase::RolledBack));
    assert_eq!(cp.count(Operation::Delete, &a), 1);
}

#[tokio::test(start_paused = true)]
async fn rollback_that_cannot_delete_leaves_run_failed() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&b, ControlPlaneError::Invalid("rejected".into()));
    cp.fail_delete(&a, [ControlPlaneError::Forbidden("cannot delete namespaces".into())]);
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let options = RunOptions {
        rollback_on_failure: true,
        rollback_on_cancel: false,
    };
    let report = engine.run(&plan, state.clone(), options).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(cp.exists(&a));
    let record = state.record(&a).unwrap();
    assert!(record.last_error.unwrap().starts_with("rollback failed"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_exponentially() {
    init_tracing();
    let (plan, a, _) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.fail_apply(&a, [transient(), transient(), transient()]);
    let config = engine_config();
    let retry = config.retry.clone();

    let engine = Engine::new(cp.clone(), config);
    let report = engine.run(&plan, state(&plan), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(cp.count(Operation::Apply, &a), 4);

    let applies: Vec<_> = cp
        .calls()
        .into_iter()
        .filter(|c| c.operation == Operation::Apply && c.resource == a)
        .map(|c| c.at)
        .collect();
    let gaps: Vec<Duration> = applies.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert_eq!(applies[3] - applies[0], retry.total_nominal_wait(4));
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_exact() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&a, transient());
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(cp.count(Operation::Apply, &a), 4);
    assert_eq!(cp.count(Operation::Apply, &b), 0);

    let record = state.record(&a).unwrap();
    assert_eq!(record.attempts, 4);
    assert!(record.last_error.unwrap().starts_with("gave up after 4 attempts"));
}

#[tokio::test(start_paused = true)]
async fn dependents_of_failed_resource_are_reported_blocked() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&a, ControlPlaneError::Invalid("namespace name taken".into()));

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state(&plan), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    let blocked: Vec<_> = report.blocked().collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].id, b);
    assert_eq!(blocked[0].phase, Phase::Pending);
    assert_eq!(
        blocked[0].blocked.as_ref().unwrap().failed_dependencies,
        vec![a]
    );
}

#[tokio::test(start_paused = true)]
async fn rolled_back_failure_still_blocks_dependents() {
    init_tracing();
    let ns = namespace("a");
    let config = config_map("a", "b").depends_on([&ns.id]);
    let consumer = config_map("a", "c").depends_on([&config.id]);
    let (b, c) = (config.id.clone(), consumer.id.clone());
    let plan = Plan::new(vec![ns, config, consumer]).unwrap();

    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&b, ControlPlaneError::Invalid("bad".into()));
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let options = RunOptions {
        rollback_on_failure: true,
        rollback_on_cancel: false,
    };
    let report = engine.run(&plan, state.clone(), options).await;

    assert_eq!(report.outcome, RunOutcome::RolledBack);
    assert_eq!(state.phase(&b), Some(Phase::RolledBack));
    assert_eq!(state.phase(&c), Some(Phase::Pending));

    let blocked: Vec<_> = report.blocked().collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].id, c);
    assert_eq!(
        blocked[0].blocked.as_ref().unwrap().failed_dependencies,
        vec![b]
    );
}

#[tokio::test(start_paused = true)]
async fn independent_resources_continue_after_a_failure() {
    init_tracing();
    let ns = namespace("a");
    let broken = config_map("a", "broken").depends_on([&ns.id]);
    let fine = config_map("a", "fine").depends_on([&ns.id]);
    let (broken_id, fine_id) = (broken.id.clone(), fine.id.clone());
    let plan = Plan::new(vec![ns, broken, fine]).unwrap();

    let cp = Arc::new(MemoryControlPlane::new());
    cp.always_fail_apply(&broken_id, ControlPlaneError::Invalid("bad".into()));
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(state.phase(&fine_id), Some(Phase::Ready));
    assert_eq!(state.phase(&broken_id), Some(Phase::Failed));
}

#[tokio::test(start_paused = true)]
async fn in_flight_resources_never_exceed_cap() {
    init_tracing();
    let ns = namespace("a");
    let mut specs = vec![ns.clone()];
    for i in 0..6 {
        specs.push(config_map("a", &format!("cm-{i}")).depends_on([&ns.id]));
    }
    let plan = Plan::new(specs).unwrap();

    let cp = Arc::new(MemoryControlPlane::new().with_latency(Duration::from_secs(1)));
    let (tx, mut rx) = events::channel();
    let state = Arc::new(RunState::new(RunId::new("run-test"), &plan).with_events(tx));
    let mut config = engine_config();
    config.max_in_flight = 2;

    let engine = Engine::new(cp, config);
    let report = engine.run(&plan, state, RunOptions::default()).await;
    assert_eq!(report.outcome, RunOutcome::Succeeded);

    let mut active = HashSet::new();
    let mut peak = 0;
    for event in drain(&mut rx) {
        if event.phase.is_in_flight() {
            active.insert(event.resource_id);
        } else {
            active.remove(&event.resource_id);
        }
        peak = peak.max(active.len());
    }
    assert_eq!(peak, 2);
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_triggers_reapply() {
    init_tracing();
    let (plan, a, _) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    let mut config = engine_config();
    config.ready_timeout = Duration::from_secs(5);
    // Polls at 0s..=5s of the first attempt all report not ready.
    cp.report_status(&a, (0..6).map(|_| HealthSignal::not_ready("0/1 replicas")));
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), config);
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(cp.count(Operation::Apply, &a), 2);

    let history = state.record(&a).unwrap().history;
    let timed_out = history
        .iter()
        .find(|t| t.from == Phase::WaitingReady && t.to == Phase::Applying)
        .unwrap();
    assert!(timed_out.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn never_ready_resource_exhausts_budget() {
    init_tracing();
    let (plan, a, _) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.never_ready(&a);
    let mut config = engine_config();
    config.ready_timeout = Duration::from_secs(3);
    config.retry.max_attempts = 2;
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), config);
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(cp.count(Operation::Apply, &a), 2);
    assert_eq!(state.phase(&a), Some(Phase::Failed));
}

#[tokio::test(start_paused = true)]
async fn failed_health_signal_fails_resource() {
    init_tracing();
    let (plan, a, _) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.report_status(
        &a,
        [
            HealthSignal::not_ready("starting"),
            HealthSignal::failed("ProgressDeadlineExceeded"),
        ],
    );
    let state = state(&plan);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state.clone(), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(cp.count(Operation::Apply, &a), 1);
    let record = state.record(&a).unwrap();
    assert_eq!(record.phase, Phase::Failed);
    assert_eq!(record.last_error.as_deref(), Some("ProgressDeadlineExceeded"));
}

#[tokio::test(start_paused = true)]
async fn transient_status_errors_keep_polling() {
    init_tracing();
    let (plan, a, _) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.fail_status(&a, [transient(), ControlPlaneError::Timeout("watch".into())]);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.run(&plan, state(&plan), RunOptions::default()).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(cp.count(Operation::Apply, &a), 1);
    assert_eq!(cp.count(Operation::GetStatus, &a), 3);
}

#[tokio::test(start_paused = true)]
async fn teardown_deletes_dependents_first() {
    init_tracing();
    let (plan, a, b) = chain();
    let cp = Arc::new(MemoryControlPlane::new());
    cp.seed(&a);
    cp.seed(&b);

    let engine = Engine::new(cp.clone(), engine_config());
    let report = engine.teardown(&plan).await;

    assert!(report.is_clean());
    assert_eq!(report.deleted, vec![b, a]);
    assert!(cp.objects().is_empty());

    let again = engine.teardown(&plan).await;
    assert!(again.deleted.is_empty());
    assert_eq!(again.absent.len(), 2);
}
