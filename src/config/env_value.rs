// ABOUTME: Configuration values that may be read from the process environment.
// ABOUTME: Credentials are usually supplied this way instead of living in the config file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// A literal string or a reference to an environment variable.
///
/// ```yaml
/// password: { env: CHAT_DB_PASSWORD }
/// log_level: info
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::Literal(value.to_string())
    }
}

/// Resolve every value in the map. Output is sorted so plans stay deterministic.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        assert_eq!(EnvValue::from("info").resolve().unwrap(), "info");
    }

    #[test]
    fn missing_variable_uses_default() {
        let value = EnvValue::FromEnv {
            var: "BOOTSTRAPPER_TEST_SURELY_UNSET".to_string(),
            default: Some("fallback".to_string()),
        };
        temp_env::with_var_unset("BOOTSTRAPPER_TEST_SURELY_UNSET", || {
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn missing_variable_without_default_is_an_error() {
        let value = EnvValue::FromEnv {
            var: "BOOTSTRAPPER_TEST_SURELY_UNSET".to_string(),
            default: None,
        };
        temp_env::with_var_unset("BOOTSTRAPPER_TEST_SURELY_UNSET", || {
            let err = value.resolve().unwrap_err();
            assert!(matches!(err, Error::MissingEnvVar(ref v) if v == "BOOTSTRAPPER_TEST_SURELY_UNSET"));
        });
    }
}
