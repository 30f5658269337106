// ABOUTME: Up command implementation.
// ABOUTME: Runs a bootstrap: hooks, run lock, engine execution, progress output and snapshots.

use bootstrapper::config::Config;
use bootstrapper::control_plane::{ControlPlane, KubeControlPlane, MemoryControlPlane};
use bootstrapper::diagnostics::{Diagnostics, Warning};
use bootstrapper::engine::{Engine, RunOptions, RunReport, RunState, events};
use bootstrapper::error::{Error, Result};
use bootstrapper::hooks::{HookContext, HookPoint, HookRunner};
use bootstrapper::lock::RunLock;
use bootstrapper::output::Output;
use bootstrapper::plan::{Plan, build_plan};
use bootstrapper::store::RunStore;
use bootstrapper::types::{ResourceName, RunId};
use futures::{FutureExt, StreamExt};
use std::env;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    pub environment: Option<String>,
    pub resume: bool,
    pub rollback: bool,
    pub rollback_on_cancel: bool,
    pub dry_run: bool,
    pub context: Option<String>,
    pub force: bool,
}

pub async fn up(config: &Config, store: &RunStore, opts: UpOptions, mut output: Output) -> Result<()> {
    output.start_timer();

    // Invalid plans are rejected before anything is locked or applied.
    let plan = build_plan(&config.desired_state()?)?;
    let run_options = RunOptions {
        rollback_on_failure: opts.rollback || config.engine.rollback,
        rollback_on_cancel: opts.rollback_on_cancel,
    };

    if opts.dry_run {
        output.progress(&format!(
            "Dry run of {} ({} resources) against an in-memory control plane",
            config.instance,
            plan.len()
        ));
        let state = RunState::new(RunId::generate(), &plan);
        let report = converge(
            Arc::new(MemoryControlPlane::new()),
            config,
            &plan,
            state,
            run_options,
            None,
            &mut interrupts(),
            &output,
        )
        .await?;
        return finish(&report, &output);
    }

    let _lock = RunLock::acquire(store.dir(), &config.instance, opts.force)?;

    let state = if opts.resume {
        let snapshot = store
            .load(&config.instance)?
            .ok_or_else(|| Error::NoRunRecorded(config.instance.to_string()))?;
        output.progress(&format!("Resuming run {}", snapshot.run_id));
        RunState::resume(snapshot, &plan)?
    } else {
        RunState::new(RunId::generate(), &plan)
    };

    let cwd = env::current_dir()?;
    let hook_runner = HookRunner::new(&cwd);
    let hook_context = HookContext {
        instance: config.instance.clone(),
        namespace: config.namespace().clone(),
        environment: opts.environment.clone(),
        run_id: state.run_id().clone(),
        fingerprint: plan.fingerprint(),
        outcome: None,
    };

    if let Some(result) = hook_runner.run(HookPoint::PreBootstrap, &hook_context).await
        && !result.success
    {
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr);
        }
        return Err(Error::Hook("pre-bootstrap hook failed".to_string()));
    }

    output.progress(&format!(
        "Bootstrapping {} ({} resources) in namespace {}",
        config.instance,
        plan.len(),
        config.namespace()
    ));

    let control_plane = Arc::new(KubeControlPlane::connect(opts.context.as_deref()).await?);
    let report = converge(
        control_plane,
        config,
        &plan,
        state,
        run_options,
        Some(store),
        &mut interrupts(),
        &output,
    )
    .await?;

    let mut diag = Diagnostics::default();
    let point = HookPoint::after(report.outcome);
    let context = hook_context.with_outcome(report.outcome);
    if let Some(result) = hook_runner.run(point, &context).await
        && !result.success
    {
        diag.warn(Warning::hook(format!("{} hook failed", point.filename())));
    }
    output.warnings(&diag);

    finish(&report, &output)
}

/// Forward every Ctrl-C into a channel.
///
/// The listener re-arms as soon as a signal is delivered, so signals arriving
/// while the caller is busy stay queued.
fn interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Writes run snapshots off the async task, warning once if they fail.
struct SnapshotWriter<'a> {
    store: Option<&'a RunStore>,
    instance: &'a ResourceName,
    failed: bool,
}

impl SnapshotWriter<'_> {
    async fn save(&mut self, state: &RunState, diag: &mut Diagnostics) {
        let Some(store) = self.store else {
            return;
        };
        if let Err(e) = store.save_async(self.instance, state.snapshot()).await
            && !self.failed
        {
            self.failed = true;
            diag.warn(Warning::snapshot_write(format!("could not save run snapshot: {}", e)));
        }
    }
}

/// Run the engine while rendering progress, persisting snapshots and watching for interrupts.
///
/// The first interrupt cancels the run; a second abandons in-flight work and
/// returns `Error::Interrupted` with the snapshot left resumable.
#[allow(clippy::too_many_arguments)]
async fn converge<C: ControlPlane + 'static>(
    control_plane: Arc<C>,
    config: &Config,
    plan: &Plan,
    state: RunState,
    options: RunOptions,
    store: Option<&RunStore>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    output: &Output,
) -> Result<RunReport> {
    let (tx, rx) = events::channel();
    let state = Arc::new(state.with_events(tx));
    let engine = Engine::new(control_plane, config.engine.clone());
    let cancel = engine.cancel_handle();
    let mut diag = Diagnostics::default();
    let mut writer = SnapshotWriter {
        store,
        instance: &config.instance,
        failed: false,
    };
    writer.save(&state, &mut diag).await;

    let mut events = pin!(events::into_stream(rx));
    let mut cancelling = false;

    // Scoped so an abandoned run (and its workers) is dropped before the final snapshot.
    let finished = {
        let mut run = pin!(engine.run(plan, Arc::clone(&state), options));
        loop {
            tokio::select! {
                report = &mut run => break Ok(report),
                Some(event) = events.next() => {
                    output.event(&event);
                    // One snapshot per batch of queued events.
                    while let Some(Some(event)) = events.next().now_or_never() {
                        output.event(&event);
                    }
                    writer.save(&state, &mut diag).await;
                }
                Some(()) = interrupts.recv() => {
                    if cancelling {
                        break Err(Error::Interrupted);
                    }
                    cancelling = true;
                    output.progress(
                        "Cancelling: waiting for in-flight resources to settle (Ctrl-C again to abort)...",
                    );
                    cancel.cancel();
                }
            }
        }
    };

    while let Some(Some(event)) = events.next().now_or_never() {
        output.event(&event);
    }
    writer.save(&state, &mut diag).await;

    let report = match finished {
        Ok(report) => report,
        Err(err) => {
            output.warnings(&diag);
            return Err(err);
        }
    };

    if let Some(store) = store
        && let Err(e) = store.archive(&config.instance, &state.snapshot())
    {
        diag.warn(Warning::snapshot_write(format!("could not archive run: {}", e)));
    }
    output.warnings(&diag);
    Ok(report)
}

fn finish(report: &RunReport, output: &Output) -> Result<()> {
    output.report(report);
    if report.outcome.is_success() {
        Ok(())
    } else {
        Err(Error::RunUnsuccessful(report.outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrapper::engine::{Phase, RunOutcome};
    use bootstrapper::output::OutputMode;
    use bootstrapper::plan::ResourceKind;
    use std::time::Duration;

    const CONFIG: &str = r#"
instance: chat
services:
  - name: server
    image: ghcr.io/example/chat-server:9.1
"#;

    /// Config, its plan, and a control plane whose Deployment never becomes ready.
    fn stuck_run() -> (Config, Plan, Arc<MemoryControlPlane>) {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plan = build_plan(&config.desired_state().unwrap()).unwrap();
        let cp = Arc::new(MemoryControlPlane::new());
        let deployment = plan
            .specs()
            .iter()
            .find(|spec| spec.kind == ResourceKind::Deployment)
            .unwrap();
        cp.never_ready(&deployment.id);
        (config, plan, cp)
    }

    #[tokio::test(start_paused = true)]
    async fn first_interrupt_cancels_and_archives() {
        let (config, plan, cp) = stuck_run();
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let output = Output::new(OutputMode::Quiet);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = RunState::new(RunId::new("run-interrupt"), &plan);

        let (result, ()) = tokio::join!(
            converge(cp, &config, &plan, state, RunOptions::default(), Some(&store), &mut rx, &output),
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                tx.send(()).unwrap();
            }
        );

        let report = result.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(
            store.archived_runs(&config.instance).unwrap(),
            vec!["run-interrupt"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_interrupt_abandons_run_with_resumable_snapshot() {
        let (config, plan, cp) = stuck_run();
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let output = Output::new(OutputMode::Quiet);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = RunState::new(RunId::new("run-interrupt"), &plan);

        let (result, ()) = tokio::join!(
            converge(cp, &config, &plan, state, RunOptions::default(), Some(&store), &mut rx, &output),
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                tx.send(()).unwrap();
                tx.send(()).unwrap();
            }
        );

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(err.exit_code(), 130);

        let snapshot = store.load(&config.instance).unwrap().unwrap();
        assert_eq!(snapshot.outcome, None);
        assert!(snapshot.resources.values().any(|r| r.phase == Phase::WaitingReady));
        assert!(RunState::resume(snapshot, &plan).is_ok());
        assert!(store.archived_runs(&config.instance).unwrap().is_empty());
    }
}
