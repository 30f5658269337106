// ABOUTME: Application service and dependent-service sections of bootstrap.yml.
// ABOUTME: Each section resolves into its DesiredState counterpart with secrets interpolated.

use serde::Deserialize;
use std::collections::HashMap;

use super::EnvValue;
use super::env_value::resolve_env_map;
use crate::error::Result;
use crate::plan::{
    DatabaseSpec, DependentService, IngressRoute, IngressSpec, ObjectStorageSpec, ServiceSpec,
    Sizing,
};
use crate::types::{ImageRef, ResourceName};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: ResourceName,

    pub image: ImageRef,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default = "default_service_port")]
    pub port: u16,

    #[serde(default)]
    pub resources: Sizing,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub requires: Vec<DependentService>,

    #[serde(default)]
    pub depends_on: Vec<ResourceName>,
}

fn default_replicas() -> u32 {
    1
}

fn default_service_port() -> u16 {
    8080
}

impl ServiceConfig {
    pub fn resolve(&self) -> Result<ServiceSpec> {
        Ok(ServiceSpec {
            name: self.name.clone(),
            image: self.image.clone(),
            replicas: self.replicas,
            port: self.port,
            sizing: self.resources.clone(),
            env: resolve_env_map(&self.env)?,
            requires: self.requires.clone(),
            depends_on: self.depends_on.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,

    #[serde(default = "default_database_image")]
    pub image: ImageRef,

    #[serde(default = "default_database_storage")]
    pub storage: String,

    #[serde(default = "default_database_port")]
    pub port: u16,

    #[serde(default = "default_database_name")]
    pub database: String,

    #[serde(default = "default_database_user")]
    pub user: String,

    pub password: EnvValue,
}

fn enabled() -> bool {
    true
}

fn default_database_image() -> ImageRef {
    ImageRef::parse("postgres:16").expect("static image reference is valid")
}

fn default_database_storage() -> String {
    "10Gi".to_string()
}

fn default_database_port() -> u16 {
    5432
}

fn default_database_name() -> String {
    "app".to_string()
}

fn default_database_user() -> String {
    "app".to_string()
}

impl DatabaseConfig {
    pub fn resolve(&self) -> Result<Option<DatabaseSpec>> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(DatabaseSpec {
            image: self.image.clone(),
            storage: self.storage.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.resolve()?,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,

    #[serde(default = "default_storage_image")]
    pub image: ImageRef,

    #[serde(default = "default_storage_size")]
    pub storage: String,

    #[serde(default = "default_storage_port")]
    pub port: u16,

    #[serde(default)]
    pub buckets: Vec<ResourceName>,

    pub access_key: EnvValue,

    pub secret_key: EnvValue,
}

fn default_storage_image() -> ImageRef {
    ImageRef::parse("minio/minio:latest").expect("static image reference is valid")
}

fn default_storage_size() -> String {
    "20Gi".to_string()
}

fn default_storage_port() -> u16 {
    9000
}

impl ObjectStorageConfig {
    pub fn resolve(&self) -> Result<Option<ObjectStorageSpec>> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(ObjectStorageSpec {
            image: self.image.clone(),
            storage: self.storage.clone(),
            port: self.port,
            buckets: self.buckets.clone(),
            access_key: self.access_key.resolve()?,
            secret_key: self.secret_key.resolve()?,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,

    pub host: String,

    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub tls_secret: Option<String>,

    /// Routes to services. Empty means `/` to the first service.
    #[serde(default)]
    pub routes: Vec<IngressRoute>,
}

impl IngressConfig {
    pub fn resolve(&self, first_service: &ResourceName) -> Option<IngressSpec> {
        if !self.enabled {
            return None;
        }
        let routes = if self.routes.is_empty() {
            vec![IngressRoute {
                path: "/".to_string(),
                service: first_service.clone(),
            }]
        } else {
            self.routes.clone()
        };
        Some(IngressSpec {
            host: self.host.clone(),
            class: self.class.clone(),
            tls_secret: self.tls_secret.clone(),
            routes,
        })
    }
}
