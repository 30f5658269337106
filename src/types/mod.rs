// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Names follow DNS label rules so they can be used verbatim as cluster object names.

mod id;
mod image_ref;
mod resource_name;

pub use id::{ResourceId, RunId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use resource_name::{ResourceName, ResourceNameError};
