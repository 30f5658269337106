// ABOUTME: Library root for bootstrapper - exposes public types for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod control_plane;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod lock;
pub mod output;
pub mod plan;
pub mod store;
pub mod types;
