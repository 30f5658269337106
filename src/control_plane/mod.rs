// ABOUTME: Control-plane client abstraction and its implementations.
// ABOUTME: KubeControlPlane talks to a cluster; MemoryControlPlane simulates one.

mod client;
mod cluster;
mod error;
mod manifest;
mod memory;
pub mod readiness;

pub use client::{ControlPlane, HealthSignal, Readiness};
pub use cluster::KubeControlPlane;
pub use error::{ConnectError, ConnectErrorKind, ControlPlaneError, ErrorClass};
pub use manifest::{FIELD_MANAGER, render};
pub use memory::{Call, MemoryControlPlane, Operation};
