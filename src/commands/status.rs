// ABOUTME: Status command implementation.
// ABOUTME: Shows the last recorded run snapshot for the configured instance.

use bootstrapper::config::Config;
use bootstrapper::error::{Error, Result};
use bootstrapper::output::Output;
use bootstrapper::store::RunStore;

pub fn status(config: &Config, store: &RunStore, output: &Output) -> Result<()> {
    let snapshot = store
        .load(&config.instance)?
        .ok_or_else(|| Error::NoRunRecorded(config.instance.to_string()))?;

    output.snapshot(config.instance.as_str(), &snapshot);

    let archived = store.archived_runs(&config.instance)?;
    if !archived.is_empty() {
        output.progress(&format!("{} earlier run(s) archived", archived.len()));
    }
    Ok(())
}
