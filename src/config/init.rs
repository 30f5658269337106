// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates bootstrap.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ResourceName};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    instance: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(name) = instance {
        config.instance =
            ResourceName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.services.head.image =
            ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let server = config.services.first();
    let engine = &config.engine;
    format!(
        r#"instance: {instance}
# namespace: {instance}

services:
  - name: {name}
    image: {image}
    port: {port}
    replicas: {replicas}
    requires: [database]

database:
  database: {instance}
  user: {instance}
  password: {{ env: CHAT_DB_PASSWORD }}

# object_storage:
#   buckets: [attachments]
#   access_key: {{ env: CHAT_STORAGE_ACCESS_KEY }}
#   secret_key: {{ env: CHAT_STORAGE_SECRET_KEY }}

# ingress:
#   host: chat.example.com

engine:
  max_in_flight: {max_in_flight}
  rollback: {rollback}
  retry:
    max_attempts: {max_attempts}
"#,
        instance = config.instance,
        name = server.name,
        image = server.image,
        port = server.port,
        replicas = server.replicas,
        max_in_flight = engine.max_in_flight,
        rollback = engine.rollback,
        max_attempts = engine.retry.max_attempts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_back() {
        let yaml = generate_template_yaml(&Config::template());
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.instance.as_str(), "chat");
        assert_eq!(config.services.len(), 1);
        assert!(config.database.is_some());
    }
}
