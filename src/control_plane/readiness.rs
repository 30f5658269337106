// ABOUTME: Readiness rules per resource kind, evaluated over an object's JSON representation.
// ABOUTME: Workloads wait for a finished rollout of the observed generation; jobs for completion.

use serde_json::Value;

use super::client::HealthSignal;
use crate::plan::ResourceKind;

/// Derive a HealthSignal from an object fetched from the control plane.
pub fn evaluate(kind: ResourceKind, object: &Value) -> HealthSignal {
    match kind {
        ResourceKind::Namespace => namespace(object),
        ResourceKind::Deployment => deployment(object),
        ResourceKind::StatefulSet => stateful_set(object),
        ResourceKind::Job => job(object),
        // Configuration and routing objects are usable as soon as they exist.
        ResourceKind::ConfigMap
        | ResourceKind::Secret
        | ResourceKind::Service
        | ResourceKind::Ingress => HealthSignal::ready(),
    }
}

fn uint(object: &Value, pointer: &str) -> Option<u64> {
    object.pointer(pointer).and_then(Value::as_u64)
}

fn count(object: &Value, pointer: &str) -> u32 {
    uint(object, pointer)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Find a status condition by type.
fn condition<'a>(object: &'a Value, type_: &str) -> Option<&'a Value> {
    object
        .pointer("/status/conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(type_))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// True when the controller has not yet seen the latest spec.
fn generation_pending(object: &Value) -> bool {
    match (
        uint(object, "/metadata/generation"),
        uint(object, "/status/observedGeneration"),
    ) {
        (Some(generation), Some(observed)) => observed < generation,
        (Some(_), None) => true,
        _ => false,
    }
}

fn namespace(object: &Value) -> HealthSignal {
    match object.pointer("/status/phase").and_then(Value::as_str) {
        Some("Terminating") => HealthSignal::not_ready("namespace is terminating"),
        _ => HealthSignal::ready(),
    }
}

fn desired_replicas(object: &Value) -> u32 {
    uint(object, "/spec/replicas")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1)
}

/// Rollout rules of `kubectl rollout status` for Deployments.
fn deployment(object: &Value) -> HealthSignal {
    if let Some(progressing) = condition(object, "Progressing")
        && str_field(progressing, "reason") == Some("ProgressDeadlineExceeded")
    {
        let message = str_field(progressing, "message").unwrap_or("progress deadline exceeded");
        return HealthSignal::failed(message);
    }

    if generation_pending(object) {
        return HealthSignal::not_ready("waiting for rollout to be observed");
    }

    let desired = desired_replicas(object);
    let updated = count(object, "/status/updatedReplicas");
    if updated < desired {
        return HealthSignal::not_ready(format!("{}/{} replicas updated", updated, desired));
    }

    let total = count(object, "/status/replicas");
    if total > updated {
        return HealthSignal::not_ready(format!(
            "{} old replicas pending termination",
            total - updated
        ));
    }

    let available = count(object, "/status/availableReplicas");
    if available < updated {
        return HealthSignal::not_ready(format!(
            "{}/{} updated replicas available",
            available, updated
        ));
    }
    HealthSignal::ready()
}

/// Rollout rules of `kubectl rollout status` for RollingUpdate StatefulSets.
fn stateful_set(object: &Value) -> HealthSignal {
    if generation_pending(object) {
        return HealthSignal::not_ready("waiting for rollout to be observed");
    }

    let desired = desired_replicas(object);
    let ready = count(object, "/status/readyReplicas");
    if ready < desired {
        return HealthSignal::not_ready(format!("{}/{} replicas ready", ready, desired));
    }

    let updated = count(object, "/status/updatedReplicas");
    if updated < desired {
        return HealthSignal::not_ready(format!("{}/{} replicas updated", updated, desired));
    }

    if let (Some(current), Some(update)) = (
        object.pointer("/status/currentRevision").and_then(Value::as_str),
        object.pointer("/status/updateRevision").and_then(Value::as_str),
    ) && current != update
    {
        return HealthSignal::not_ready(format!(
            "waiting for revision {} to replace {}",
            update, current
        ));
    }
    HealthSignal::ready()
}

fn job(object: &Value) -> HealthSignal {
    let failures = count(object, "/status/failed");

    if count(object, "/status/succeeded") >= 1 {
        return HealthSignal::ready().with_retries(failures);
    }

    if let Some(failed) = condition(object, "Failed")
        && str_field(failed, "status") == Some("True")
    {
        let message = str_field(failed, "message").unwrap_or("job failed");
        return HealthSignal::failed(message).with_retries(failures);
    }

    HealthSignal::not_ready("job has not completed").with_retries(failures)
}
