// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Prevents accidental swapping of resource and run identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
/// Using empty enums prevents instantiation and requires no trait bounds.
pub enum ResourceMarker {}
pub enum RunMarker {}

/// A type-safe identifier that prevents accidental mixing of different ID types.
///
/// A `ResourceId` names one object in a plan (`kind/namespace/name`), a `RunId`
/// names one bootstrap execution. Both are strings underneath, but passing one
/// where the other is expected does not compile.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl Id<ResourceMarker> {
    /// Build the identifier for an object of `kind` named `name`.
    /// Cluster-scoped objects pass `None` as namespace.
    pub fn for_object(kind: &str, namespace: Option<&str>, name: &str) -> Self {
        let kind = kind.to_ascii_lowercase();
        match namespace {
            Some(ns) => Self::new(format!("{kind}/{ns}/{name}")),
            None => Self::new(format!("{kind}/{name}")),
        }
    }
}

impl Id<RunMarker> {
    /// Generate a fresh run identifier from the current time and process.
    pub fn generate() -> Self {
        let now = chrono::Utc::now();
        Self::new(format!(
            "run-{}-{}",
            now.format("%Y%m%d%H%M%S"),
            std::process::id()
        ))
    }
}

// Manual trait implementations that don't require T to implement the trait.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

pub type ResourceId = Id<ResourceMarker>;
pub type RunId = Id<RunMarker>;
