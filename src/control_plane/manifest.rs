// ABOUTME: Renders a ResourceSpec into the JSON object sent to the control plane.
// ABOUTME: Output is deterministic for a given spec so repeated applies are no-ops.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::plan::{
    EnvSource, IngressPayload, JobPayload, ResourcePayload, ResourceSpec, VolumeClaim, Workload,
};

/// Field manager recorded on server-side applied objects.
pub const FIELD_MANAGER: &str = "bootstrapper";

/// Build the full object (apiVersion, kind, metadata, body) for `spec`.
pub fn render(spec: &ResourceSpec) -> Value {
    let mut metadata = Map::new();
    metadata.insert("name".into(), json!(spec.name.as_str()));
    if let Some(ns) = &spec.namespace {
        metadata.insert("namespace".into(), json!(ns.as_str()));
    }
    if let Some(labels) = object_labels(&spec.payload) {
        metadata.insert("labels".into(), json!(labels));
    }

    let mut object = Map::new();
    object.insert("apiVersion".into(), json!(spec.kind.api_version()));
    object.insert("kind".into(), json!(spec.kind.as_str()));
    object.insert("metadata".into(), Value::Object(metadata));

    match &spec.payload {
        ResourcePayload::Namespace { .. } => {}
        ResourcePayload::ConfigMap { data } => {
            object.insert("data".into(), json!(data));
        }
        ResourcePayload::Secret { data } => {
            let string_data: BTreeMap<&str, &str> =
                data.iter().map(|(k, v)| (k.as_str(), v.expose())).collect();
            object.insert("type".into(), json!("Opaque"));
            object.insert("stringData".into(), json!(string_data));
        }
        ResourcePayload::Service {
            selector,
            ports,
            headless,
        } => {
            let ports: Vec<Value> = ports
                .iter()
                .map(|p| json!({"name": p.name, "port": p.port, "targetPort": p.target_port}))
                .collect();
            let mut body = json!({"selector": selector, "ports": ports});
            if *headless {
                body["clusterIP"] = json!("None");
            }
            object.insert("spec".into(), body);
        }
        ResourcePayload::Deployment { workload } => {
            object.insert(
                "spec".into(),
                json!({
                    "replicas": workload.replicas,
                    "selector": {"matchLabels": workload.labels},
                    "template": pod_template(spec.name.as_str(), workload, None),
                }),
            );
        }
        ResourcePayload::StatefulSet {
            workload,
            service_name,
            volume,
        } => {
            object.insert(
                "spec".into(),
                json!({
                    "serviceName": service_name,
                    "replicas": workload.replicas,
                    "selector": {"matchLabels": workload.labels},
                    "template": pod_template(spec.name.as_str(), workload, Some(volume)),
                    "volumeClaimTemplates": [{
                        "metadata": {"name": volume.name},
                        "spec": {
                            "accessModes": ["ReadWriteOnce"],
                            "resources": {"requests": {"storage": volume.size}},
                        },
                    }],
                }),
            );
        }
        ResourcePayload::Job(job) => {
            object.insert("spec".into(), job_spec(spec.name.as_str(), job));
        }
        ResourcePayload::Ingress(ingress) => {
            object.insert("spec".into(), ingress_spec(ingress));
        }
    }

    Value::Object(object)
}

fn object_labels(payload: &ResourcePayload) -> Option<&BTreeMap<String, String>> {
    match payload {
        ResourcePayload::Namespace { labels } => Some(labels),
        ResourcePayload::Deployment { workload } | ResourcePayload::StatefulSet { workload, .. } => {
            Some(&workload.labels)
        }
        _ => None,
    }
}

fn env_from(sources: &[EnvSource]) -> Vec<Value> {
    sources
        .iter()
        .map(|source| match source {
            EnvSource::ConfigMap(name) => json!({"configMapRef": {"name": name}}),
            EnvSource::Secret(name) => json!({"secretRef": {"name": name}}),
        })
        .collect()
}

fn pod_template(name: &str, workload: &Workload, volume: Option<&VolumeClaim>) -> Value {
    let mut container = json!({
        "name": name,
        "image": workload.image.to_string(),
        "ports": [{"containerPort": workload.port}],
    });

    if !workload.args.is_empty() {
        container["args"] = json!(workload.args);
    }
    if !workload.env.is_empty() {
        let env: Vec<Value> = workload
            .env
            .iter()
            .map(|(k, v)| json!({"name": k, "value": v}))
            .collect();
        container["env"] = json!(env);
    }
    if !workload.env_from.is_empty() {
        container["envFrom"] = json!(env_from(&workload.env_from));
    }

    let mut requests = Map::new();
    if let Some(cpu) = &workload.sizing.cpu {
        requests.insert("cpu".into(), json!(cpu));
    }
    if let Some(memory) = &workload.sizing.memory {
        requests.insert("memory".into(), json!(memory));
    }
    if !requests.is_empty() {
        container["resources"] = json!({"requests": requests});
    }

    if let Some(volume) = volume {
        container["volumeMounts"] = json!([{"name": volume.name, "mountPath": volume.mount_path}]);
    }

    json!({
        "metadata": {"labels": workload.labels},
        "spec": {"containers": [container]},
    })
}

fn job_spec(name: &str, job: &JobPayload) -> Value {
    let mut container = json!({
        "name": name,
        "image": job.image.to_string(),
        "command": job.command,
    });
    if !job.env_from.is_empty() {
        container["envFrom"] = json!(env_from(&job.env_from));
    }

    json!({
        "backoffLimit": job.backoff_limit,
        "template": {
            "spec": {
                "restartPolicy": "OnFailure",
                "containers": [container],
            },
        },
    })
}

fn ingress_spec(ingress: &IngressPayload) -> Value {
    let paths: Vec<Value> = ingress
        .rules
        .iter()
        .map(|rule| {
            json!({
                "path": rule.path,
                "pathType": "Prefix",
                "backend": {"service": {"name": rule.service, "port": {"number": rule.port}}},
            })
        })
        .collect();

    let mut body = json!({
        "rules": [{"host": ingress.host, "http": {"paths": paths}}],
    });
    if let Some(class) = &ingress.class {
        body["ingressClassName"] = json!(class);
    }
    if let Some(secret) = &ingress.tls_secret {
        body["tls"] = json!([{"hosts": [ingress.host], "secretName": secret}]);
    }
    body
}
