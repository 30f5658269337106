// ABOUTME: ResourceSpec: one unit of work against the control plane.
// ABOUTME: Payloads are a kind-tagged enum so the engine never branches on resource kind.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::desired::Sizing;
use crate::types::{ImageRef, ResourceId, ResourceName};

/// Kinds of control-plane objects a plan can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Namespace,
    ConfigMap,
    Secret,
    Service,
    Deployment,
    StatefulSet,
    Job,
    Ingress,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Job => "Job",
            ResourceKind::Ingress => "Ingress",
        }
    }

    /// API group (empty for the core group).
    pub fn group(&self) -> &'static str {
        match self {
            ResourceKind::Deployment | ResourceKind::StatefulSet => "apps",
            ResourceKind::Job => "batch",
            ResourceKind::Ingress => "networking.k8s.io",
            _ => "",
        }
    }

    pub fn version(&self) -> &'static str {
        "v1"
    }

    pub fn api_version(&self) -> String {
        match self.group() {
            "" => self.version().to_string(),
            group => format!("{}/{}", group, self.version()),
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential value. Never printed or serialized in clear text.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

/// Where a workload imports environment variables from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    ConfigMap(String),
    Secret(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
}

/// Container workload shared by Deployments and StatefulSets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workload {
    pub image: ImageRef,
    pub replicas: u32,
    pub labels: BTreeMap<String, String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvSource>,
    pub sizing: Sizing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeClaim {
    pub name: String,
    pub mount_path: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPayload {
    pub image: ImageRef,
    pub command: Vec<String>,
    pub env_from: Vec<EnvSource>,
    pub backoff_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    pub path: String,
    pub service: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressPayload {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,
    pub rules: Vec<IngressRule>,
}

/// Kind-specific body of a ResourceSpec.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourcePayload {
    Namespace {
        labels: BTreeMap<String, String>,
    },
    ConfigMap {
        data: BTreeMap<String, String>,
    },
    Secret {
        data: BTreeMap<String, SecretValue>,
    },
    Service {
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
        headless: bool,
    },
    Deployment {
        workload: Workload,
    },
    StatefulSet {
        workload: Workload,
        service_name: String,
        volume: VolumeClaim,
    },
    Job(JobPayload),
    Ingress(IngressPayload),
}

impl ResourcePayload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourcePayload::Namespace { .. } => ResourceKind::Namespace,
            ResourcePayload::ConfigMap { .. } => ResourceKind::ConfigMap,
            ResourcePayload::Secret { .. } => ResourceKind::Secret,
            ResourcePayload::Service { .. } => ResourceKind::Service,
            ResourcePayload::Deployment { .. } => ResourceKind::Deployment,
            ResourcePayload::StatefulSet { .. } => ResourceKind::StatefulSet,
            ResourcePayload::Job(_) => ResourceKind::Job,
            ResourcePayload::Ingress(_) => ResourceKind::Ingress,
        }
    }
}

/// One object the bootstrap creates or updates, with its ordering constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSpec {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: ResourceName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<ResourceName>,
    pub payload: ResourcePayload,
    pub depends_on: Vec<ResourceId>,
}

impl ResourceSpec {
    /// Create a spec; cluster-scoped kinds ignore `namespace`.
    pub fn new(name: ResourceName, namespace: Option<ResourceName>, payload: ResourcePayload) -> Self {
        let kind = payload.kind();
        let namespace = if kind.is_namespaced() { namespace } else { None };
        let id = ResourceId::for_object(
            kind.as_str(),
            namespace.as_ref().map(ResourceName::as_str),
            name.as_str(),
        );
        Self {
            id,
            kind,
            name,
            namespace,
            payload,
            depends_on: Vec::new(),
        }
    }

    /// Add dependencies, keeping the list sorted and free of duplicates.
    pub fn depends_on<'a>(mut self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        for id in ids {
            if !self.depends_on.contains(id) {
                self.depends_on.push(id.clone());
            }
        }
        self.depends_on.sort();
        self
    }
}
