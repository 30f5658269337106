// ABOUTME: Command module aggregator for the bootstrapper CLI.
// ABOUTME: Shared config loading plus the plan, up, down and status handlers.

mod down;
mod plan;
mod status;
mod up;

pub use down::down;
pub use plan::plan;
pub use status::status;
pub use up::{UpOptions, up};

use bootstrapper::config::Config;
use bootstrapper::error::Result;
use std::path::Path;

/// Discover the config in `dir` and apply the environment overlay, if any.
pub fn load_config(dir: &Path, environment: Option<&str>) -> Result<Config> {
    let config = Config::discover(dir)?;
    match environment {
        Some(name) => config.for_environment(name),
        None => Ok(config),
    }
}
