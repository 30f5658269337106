// ABOUTME: Convergence engine tuning read from the `engine:` config section.
// ABOUTME: Concurrency cap, retry budget, readiness timeouts and rollback default.

use serde::Deserialize;
use std::time::Duration;

use crate::engine::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of resources driven concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How long one attempt waits for a resource to report ready.
    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Tear down created resources when the run fails.
    #[serde(default)]
    pub rollback: bool,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            retry: RetryPolicy::default(),
            ready_timeout: default_ready_timeout(),
            poll_interval: default_poll_interval(),
            rollback: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_in_flight == 0 {
            return Err("engine.max_in_flight must be at least 1".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("engine.poll_interval must be greater than zero".to_string());
        }
        if self.ready_timeout < self.poll_interval {
            return Err("engine.ready_timeout must be at least engine.poll_interval".to_string());
        }
        self.retry.validate()
    }
}
