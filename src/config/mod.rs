// ABOUTME: Configuration types and parsing for bootstrap.yml.
// ABOUTME: Handles YAML parsing, env var interpolation, and environment overlays.

mod deserialize;
mod engine;
mod env_value;
mod init;
mod services;

pub use engine::EngineConfig;
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use services::{DatabaseConfig, IngressConfig, ObjectStorageConfig, ServiceConfig};

use crate::error::{Error, Result};
use crate::plan::DesiredState;
use crate::types::{ImageRef, ResourceName};
use deserialize::deserialize_services;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "bootstrap.yml";
pub const CONFIG_FILENAME_ALT: &str = "bootstrap.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".bootstrapper/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instance: ResourceName,

    /// Target namespace; defaults to the instance name.
    #[serde(default)]
    pub namespace: Option<ResourceName>,

    #[serde(deserialize_with = "deserialize_services")]
    pub services: NonEmpty<ServiceConfig>,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub object_storage: Option<ObjectStorageConfig>,

    #[serde(default)]
    pub ingress: Option<IngressConfig>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub environments: HashMap<String, Environment>,
}

/// Per-environment overrides layered on top of the base config.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Environment {
    #[serde(default)]
    pub namespace: Option<ResourceName>,

    /// Merged into every service's env.
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    /// Image override per service name.
    #[serde(default)]
    pub images: HashMap<String, ImageRef>,

    /// Replica override per service name.
    #[serde(default)]
    pub replicas: HashMap<String, u32>,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub object_storage: Option<ObjectStorageConfig>,

    #[serde(default)]
    pub ingress: Option<IngressConfig>,

    #[serde(default)]
    pub engine: Option<EngineConfig>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config
            .engine
            .validate()
            .map_err(Error::InvalidConfig)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        candidates
            .iter()
            .find(|path| path.exists())
            .map(|path| Self::load(path))
            .unwrap_or_else(|| Err(Error::ConfigNotFound(dir.to_path_buf())))
    }

    /// Apply the overlay named `name` and return the merged config.
    pub fn for_environment(&self, name: &str) -> Result<Config> {
        let overlay = self
            .environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(ref namespace) = overlay.namespace {
            merged.namespace = Some(namespace.clone());
        }

        for key in overlay.images.keys().chain(overlay.replicas.keys()) {
            if !self.services.iter().any(|s| s.name.as_str() == key) {
                return Err(Error::InvalidConfig(format!(
                    "environment '{}' overrides unknown service '{}'",
                    name, key
                )));
            }
        }

        for service in merged.services.iter_mut() {
            for (k, v) in &overlay.env {
                service.env.insert(k.clone(), v.clone());
            }
            if let Some(image) = overlay.images.get(service.name.as_str()) {
                service.image = image.clone();
            }
            if let Some(replicas) = overlay.replicas.get(service.name.as_str()) {
                service.replicas = *replicas;
            }
        }

        if overlay.database.is_some() {
            merged.database = overlay.database.clone();
        }
        if overlay.object_storage.is_some() {
            merged.object_storage = overlay.object_storage.clone();
        }
        if overlay.ingress.is_some() {
            merged.ingress = overlay.ingress.clone();
        }
        if let Some(ref engine) = overlay.engine {
            engine.validate().map_err(Error::InvalidConfig)?;
            merged.engine = engine.clone();
        }

        Ok(merged)
    }

    /// Namespace resources are created in.
    pub fn namespace(&self) -> &ResourceName {
        self.namespace.as_ref().unwrap_or(&self.instance)
    }

    /// Resolve secrets and produce the DesiredState handed to the plan builder.
    pub fn desired_state(&self) -> Result<DesiredState> {
        let services = self
            .services
            .iter()
            .map(ServiceConfig::resolve)
            .collect::<Result<Vec<_>>>()?;
        let services = NonEmpty::from_vec(services)
            .ok_or_else(|| Error::InvalidConfig("at least one service is required".to_string()))?;

        let database = match &self.database {
            Some(db) => db.resolve()?,
            None => None,
        };
        let object_storage = match &self.object_storage {
            Some(storage) => storage.resolve()?,
            None => None,
        };
        let ingress = self
            .ingress
            .as_ref()
            .and_then(|ingress| ingress.resolve(&services.head.name));

        Ok(DesiredState {
            instance: self.instance.clone(),
            namespace: self.namespace().clone(),
            services,
            database,
            object_storage,
            ingress,
        })
    }

    pub fn template() -> Self {
        let instance = ResourceName::new("chat").expect("template name is valid");
        Config {
            instance,
            namespace: None,
            services: NonEmpty::new(ServiceConfig {
                name: ResourceName::new("server").expect("template name is valid"),
                image: ImageRef::parse("ghcr.io/example/chat-server:latest")
                    .expect("template image is valid"),
                replicas: 1,
                port: 8065,
                resources: Default::default(),
                env: HashMap::new(),
                requires: vec![crate::plan::DependentService::Database],
                depends_on: vec![],
            }),
            database: Some(DatabaseConfig {
                enabled: true,
                image: ImageRef::parse("postgres:16").expect("template image is valid"),
                storage: "10Gi".to_string(),
                port: 5432,
                database: "chat".to_string(),
                user: "chat".to_string(),
                password: EnvValue::FromEnv {
                    var: "CHAT_DB_PASSWORD".to_string(),
                    default: None,
                },
            }),
            object_storage: None,
            ingress: None,
            engine: EngineConfig::default(),
            environments: HashMap::new(),
        }
    }
}
