// ABOUTME: Plan construction errors.
// ABOUTME: Every variant is an invalid plan, raised before the cluster is touched.

use crate::plan::DependentService;
use crate::types::ResourceNameError;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid plan: dependency cycle {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("invalid plan: service '{service}' requires {dependency}, which is disabled")]
    DisabledDependency {
        service: String,
        dependency: DependentService,
    },

    #[error("invalid plan: {referenced_by} references unknown service '{name}'")]
    UnknownService { referenced_by: String, name: String },

    #[error("invalid plan: duplicate service '{0}'")]
    DuplicateService(String),

    #[error("invalid plan: service name '{service}' is reserved for the generated {owner}")]
    ReservedServiceName {
        service: String,
        owner: DependentService,
    },

    #[error("invalid plan: duplicate resource '{0}'")]
    DuplicateResource(String),

    #[error("invalid plan: resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownResource {
        resource: String,
        dependency: String,
    },

    #[error("invalid plan: {0}")]
    InvalidName(#[from] ResourceNameError),
}
