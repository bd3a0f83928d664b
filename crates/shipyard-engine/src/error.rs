//! Error types for Shipyard Engine
//!
//! - [`CheckError`]: one resource check; plugin failures become
//!   `ResourceCheckError` events, repository failures propagate
//! - [`InterventionError`]: operator actions (pin, veto, judgement)

use shipyard_core::{ErrorClass, PluginError, RepositoryError, ResourceId, ResourceKind};

/// Failure of a single resource check
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Desired or current state could not be resolved
    #[error("unable to resolve {id}: {source}")]
    Resolution {
        /// Resource being checked
        id: ResourceId,
        /// Handler failure
        source: PluginError,
    },

    /// Create or update failed
    #[error("unable to actuate {id}: {source}")]
    Actuation {
        /// Resource being checked
        id: ResourceId,
        /// Handler failure
        source: PluginError,
    },

    /// No handler registered for the resource kind
    #[error("no resource handler supports {kind}")]
    NoHandler {
        /// Unsupported kind
        kind: ResourceKind,
    },

    /// The resource is not part of any environment of its delivery config
    #[error("resource {id} is not in any environment of {config}")]
    EnvironmentNotFound {
        /// Resource being checked
        id: ResourceId,
        /// Delivery config searched
        config: String,
    },

    /// Repository failure
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CheckError {
    /// Diagnostic type name published with `ResourceCheckError`
    #[must_use]
    pub fn error_type(&self) -> &str {
        match self {
            Self::Resolution { source, .. } | Self::Actuation { source, .. } => source.error_type(),
            Self::NoHandler { .. } => "NoSupportedResourceHandler",
            Self::EnvironmentNotFound { .. } => "EnvironmentNotFound",
            Self::Repository(_) => "RepositoryError",
        }
    }

    /// Classify the failure
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Resolution { source, .. } | Self::Actuation { source, .. } => source.class(),
            Self::NoHandler { .. } | Self::EnvironmentNotFound { .. } => ErrorClass::User,
            Self::Repository(_) => ErrorClass::System,
        }
    }

    /// Transient; deferred to the next check rather than reported as an error
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Failure of an operator action
#[derive(Debug, thiserror::Error)]
pub enum InterventionError {
    /// Application has no delivery config
    #[error("no delivery config for application {0}")]
    NoSuchDeliveryConfig(String),

    /// Artifact reference is not declared in the delivery config
    #[error("no artifact {reference} in delivery config {config}")]
    ArtifactNotFound {
        /// Delivery config name
        config: String,
        /// Artifact reference
        reference: String,
    },

    /// Environment is not declared in the delivery config
    #[error("no environment {environment} in delivery config {config}")]
    EnvironmentNotFound {
        /// Delivery config name
        config: String,
        /// Environment name
        environment: String,
    },

    /// The repository refused the veto
    #[error("version {version} of {reference} cannot be vetoed in {environment}")]
    InvalidVeto {
        /// Environment name
        environment: String,
        /// Artifact reference
        reference: String,
        /// Version
        version: String,
    },

    /// Environment does not declare the constraint
    #[error("environment {environment} has no {constraint_type} constraint")]
    ConstraintNotFound {
        /// Environment name
        environment: String,
        /// Constraint type key
        constraint_type: String,
    },

    /// The task launcher failed to cancel obsolete tasks
    #[error("unable to cancel tasks: {0}")]
    TaskCancellation(#[source] PluginError),

    /// Repository failure
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
