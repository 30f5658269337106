// ABOUTME: DNS-compatible object name validation.
// ABOUTME: Ensures names follow RFC 1123 label requirements accepted by the control plane.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceNameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name '{0}' exceeds maximum length of 63 characters")]
    TooLong(String),

    #[error("name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("name must be lowercase")]
    NotLowercase,

    #[error("invalid character in name: '{0}'")]
    InvalidChar(char),
}

/// A lowercase RFC 1123 label: instance names, namespaces, service names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(value: &str) -> Result<Self, ResourceNameError> {
        if value.is_empty() {
            return Err(ResourceNameError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(ResourceNameError::TooLong(value.to_string()));
        }

        if value.starts_with('-') {
            return Err(ResourceNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(ResourceNameError::EndsWithHyphen);
        }

        if value.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ResourceNameError::NotLowercase);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
        {
            return Err(ResourceNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    /// Derive a child name (`<self>-<suffix>`), validating the result.
    pub fn child(&self, suffix: &str) -> Result<Self, ResourceNameError> {
        Self::new(&format!("{}-{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ResourceName::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_names_are_validated() {
        let base = ResourceName::new("chat").unwrap();
        assert_eq!(base.child("db").unwrap().as_str(), "chat-db");

        let long = ResourceName::new(&"a".repeat(60)).unwrap();
        assert!(matches!(
            long.child("storage"),
            Err(ResourceNameError::TooLong(_))
        ));
    }
}
