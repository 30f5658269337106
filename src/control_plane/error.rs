// ABOUTME: Control-plane error types and their retry classification.
// ABOUTME: Transient errors are retried by the engine; terminal errors fail the resource.

use snafu::Snafu;

/// Whether an error may go away by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network timeout, rate limit, conflict, server-side hiccup.
    Transient,
    /// Validation rejected, permission denied, quota exceeded.
    Terminal,
}

/// Errors from control-plane operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Invalid(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl ControlPlaneError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ControlPlaneError::Timeout(_)
            | ControlPlaneError::RateLimited(_)
            | ControlPlaneError::Conflict(_)
            | ControlPlaneError::Unavailable(_)
            | ControlPlaneError::NotFound(_) => ErrorClass::Transient,
            ControlPlaneError::Invalid(_)
            | ControlPlaneError::Forbidden(_)
            | ControlPlaneError::QuotaExceeded(_) => ErrorClass::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound(_))
    }

    /// Map an API status code and message onto the taxonomy.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => ControlPlaneError::NotFound(message),
            409 => ControlPlaneError::Conflict(message),
            429 => ControlPlaneError::RateLimited(message),
            408 | 504 => ControlPlaneError::Timeout(message),
            403 if message.contains("exceeded quota") => ControlPlaneError::QuotaExceeded(message),
            401 | 403 => ControlPlaneError::Forbidden(message),
            500..=599 => ControlPlaneError::Unavailable(message),
            _ => ControlPlaneError::Invalid(message),
        }
    }
}

/// Failure to establish a control-plane client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectError {
    #[snafu(display("failed to load kubeconfig context '{context}': {source}"))]
    Kubeconfig {
        context: String,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("failed to infer cluster configuration: {source}"))]
    Infer {
        source: kube::config::InferConfigError,
    },

    #[snafu(display("failed to reach control plane: {source}"))]
    Client { source: kube::Error },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// Credentials or cluster address could not be determined.
    Configuration,
    /// The control plane did not answer.
    Unreachable,
}

impl ConnectError {
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            ConnectError::Kubeconfig { .. } | ConnectError::Infer { .. } => {
                ConnectErrorKind::Configuration
            }
            ConnectError::Client { .. } => ConnectErrorKind::Unreachable,
        }
    }
}
