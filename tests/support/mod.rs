// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup, small hand-built plans, and a fast deterministic engine config.

#![allow(dead_code)]

use bootstrapper::config::EngineConfig;
use bootstrapper::engine::{EventReceiver, ProgressEvent, RetryPolicy};
use bootstrapper::plan::{Plan, ResourcePayload, ResourceSpec};
use bootstrapper::types::{ResourceId, ResourceName};
use std::collections::BTreeMap;
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("bootstrapper=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn name(value: &str) -> ResourceName {
    ResourceName::new(value).unwrap()
}

pub fn namespace(value: &str) -> ResourceSpec {
    ResourceSpec::new(
        name(value),
        None,
        ResourcePayload::Namespace {
            labels: BTreeMap::new(),
        },
    )
}

/// A ConfigMap in `ns` that depends on nothing until told otherwise.
pub fn config_map(ns: &str, value: &str) -> ResourceSpec {
    ResourceSpec::new(
        name(value),
        Some(name(ns)),
        ResourcePayload::ConfigMap {
            data: BTreeMap::from([("key".to_string(), value.to_string())]),
        },
    )
}

/// Two-resource plan: namespace `a` and a ConfigMap `b` inside it.
pub fn chain() -> (Plan, ResourceId, ResourceId) {
    let a = namespace("a");
    let b = config_map("a", "b").depends_on([&a.id]);
    let (a_id, b_id) = (a.id.clone(), b.id.clone());
    (Plan::new(vec![a, b]).unwrap(), a_id, b_id)
}

/// Jitter-free engine config: 4 attempts, 1s doubling backoff, 1s polls, 10s readiness.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        max_in_flight: 4,
        retry: RetryPolicy::fixed(4, Duration::from_secs(1), Duration::from_secs(30)),
        ready_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
        rollback: false,
    }
}

/// Everything already sent on the channel.
pub fn drain(rx: &mut EventReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
