// ABOUTME: Down command implementation.
// ABOUTME: Deletes every plan resource, dependents first, under the run lock.

use bootstrapper::config::Config;
use bootstrapper::control_plane::KubeControlPlane;
use bootstrapper::diagnostics::{Diagnostics, Warning};
use bootstrapper::engine::Engine;
use bootstrapper::error::{Error, Result};
use bootstrapper::lock::RunLock;
use bootstrapper::output::Output;
use bootstrapper::plan::build_plan;
use bootstrapper::store::RunStore;
use std::sync::Arc;

pub async fn down(
    config: &Config,
    store: &RunStore,
    context: Option<&str>,
    force: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let plan = build_plan(&config.desired_state()?)?;
    let _lock = RunLock::acquire(store.dir(), &config.instance, force)?;

    output.progress(&format!(
        "Tearing down {} ({} resources) in namespace {}",
        config.instance,
        plan.len(),
        config.namespace()
    ));

    let control_plane = Arc::new(KubeControlPlane::connect(context).await?);
    let engine = Engine::new(control_plane, config.engine.clone());
    let report = engine.teardown(&plan).await;
    output.teardown(&report);

    if !report.is_clean() {
        return Err(Error::TeardownIncomplete(report.failed.len()));
    }

    if let Err(e) = store.clear(&config.instance) {
        diag.warn(Warning::teardown(format!("could not clear run snapshot: {}", e)));
    }
    output.warnings(&diag);
    output.success("Teardown complete");
    Ok(())
}
