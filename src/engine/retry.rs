// ABOUTME: Retry budget and exponential backoff schedule for control-plane calls.
// ABOUTME: Delays double per attempt, are capped, and are shortened by random jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often and how patiently a resource operation is retried.
///
/// `max_attempts` counts every attempt, the first one included: a budget of 4
/// allows one try plus three retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Fraction (0.0 to 1.0) of each delay that may be randomly shaved off.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A policy without jitter, for callers that need a predictable schedule.
    pub fn fixed(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    /// Whether `attempts` already used the whole budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Undithered delay after the `failed_attempts`-th failure (1-based).
    pub fn nominal_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay to wait after the `failed_attempts`-th failure, jitter applied.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let nominal = self.nominal_delay(failed_attempts);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let shave = rand::thread_rng().gen_range(0.0..jitter);
        nominal.mul_f64(1.0 - shave)
    }

    /// Sum of nominal delays a resource waits before its `attempts`-th attempt.
    pub fn total_nominal_wait(&self, attempts: u32) -> Duration {
        (1..attempts).map(|n| self.nominal_delay(n)).sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be between 0.0 and 1.0".to_string());
        }
        if self.base_delay > self.max_delay {
            return Err("retry.base_delay cannot exceed retry.max_delay".to_string());
        }
        Ok(())
    }
}
