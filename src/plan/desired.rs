// ABOUTME: Fully resolved description of the deployment a bootstrap run converges toward.
// ABOUTME: Built from configuration with secrets interpolated; immutable for the whole run.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{ImageRef, ResourceName};

/// Target topology for one application instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub instance: ResourceName,
    pub namespace: ResourceName,
    pub services: NonEmpty<ServiceSpec>,
    pub database: Option<DatabaseSpec>,
    pub object_storage: Option<ObjectStorageSpec>,
    pub ingress: Option<IngressSpec>,
}

impl DesiredState {
    /// Whether the dependent service behind a toggle is part of this deployment.
    pub fn provides(&self, dependency: DependentService) -> bool {
        match dependency {
            DependentService::Database => self.database.is_some(),
            DependentService::ObjectStorage => self.object_storage.is_some(),
        }
    }
}

/// One application service of the platform (API server, push proxy, job runner...).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: ResourceName,
    pub image: ImageRef,
    pub replicas: u32,
    pub port: u16,
    pub sizing: Sizing,
    pub env: BTreeMap<String, String>,
    /// Dependent services that must be ready before this service starts.
    pub requires: Vec<DependentService>,
    /// Other application services that must be ready before this one starts.
    pub depends_on: Vec<ResourceName>,
}

/// Resource requests for a workload, in control-plane quantity notation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sizing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Dependent services a bootstrap can provision alongside the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentService {
    Database,
    ObjectStorage,
}

impl fmt::Display for DependentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependentService::Database => f.write_str("database"),
            DependentService::ObjectStorage => f.write_str("object_storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSpec {
    pub image: ImageRef,
    pub storage: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStorageSpec {
    pub image: ImageRef,
    pub storage: String,
    pub port: u16,
    pub buckets: Vec<ResourceName>,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngressSpec {
    pub host: String,
    pub class: Option<String>,
    pub tls_secret: Option<String>,
    pub routes: Vec<IngressRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRoute {
    pub path: String,
    pub service: ResourceName,
}
