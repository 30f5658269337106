// ABOUTME: Plan command implementation.
// ABOUTME: Builds and prints the ordered resource plan; never contacts the cluster.

use bootstrapper::config::Config;
use bootstrapper::error::Result;
use bootstrapper::output::Output;
use bootstrapper::plan::build_plan;

pub fn plan(config: &Config, output: &Output) -> Result<()> {
    let desired = config.desired_state()?;
    let plan = build_plan(&desired)?;
    output.plan(&plan);
    Ok(())
}
