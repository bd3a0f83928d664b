//! Error types for Shipyard Core
//!
//! Provides error handling for:
//! - Repository access failures (propagate out of a single check)
//! - Resource handler failures, classified as transient, user or system
//! - Constraint evaluation failures
//! - Scheduled agent failures
//! - Settings loading

use std::fmt;

/// Repository failure
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Entity not found
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind, e.g. "delivery config"
        entity: &'static str,
        /// Lookup key
        key: String,
    },

    /// Write conflicted with existing state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend (connectivity, serialization, ...) failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Create a not-found error
    #[inline]
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Check if this is a not-found error
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Classification of a resource check failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Expected to resolve on its own on a later check
    Transient,
    /// Misconfiguration that needs a user to correct it
    User,
    /// Unexpected failure
    System,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::User => "user",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Failure raised by a resource handler
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    /// A dependency of the resource is not resolvable yet
    #[error("currently unresolvable: {0}")]
    CurrentlyUnresolvable(String),

    /// The resource is misconfigured
    #[error("{error_type}: {message}")]
    User {
        /// Diagnostic type name
        error_type: String,
        /// Human readable message
        message: String,
    },

    /// Anything else
    #[error("{error_type}: {message}")]
    System {
        /// Diagnostic type name
        error_type: String,
        /// Human readable message
        message: String,
    },
}

impl PluginError {
    /// Create a user error
    #[must_use]
    pub fn user(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::User {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Create a system error
    #[must_use]
    pub fn system(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::System {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Classify the failure
    #[inline]
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::CurrentlyUnresolvable(_) => ErrorClass::Transient,
            Self::User { .. } => ErrorClass::User,
            Self::System { .. } => ErrorClass::System,
        }
    }

    /// Diagnostic type name preserved for published errors
    #[must_use]
    pub fn error_type(&self) -> &str {
        match self {
            Self::CurrentlyUnresolvable(_) => "CurrentlyUnresolvable",
            Self::User { error_type, .. } | Self::System { error_type, .. } => error_type,
        }
    }

    /// Message without the type prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::CurrentlyUnresolvable(message)
            | Self::User { message, .. }
            | Self::System { message, .. } => message,
        }
    }
}

/// Failure raised by a constraint evaluator
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Repository read/write failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The constraint declared on the environment is not the one this evaluator handles
    #[error("constraint {constraint_type} is not declared in environment {environment}")]
    MissingConstraint {
        /// Constraint type key
        constraint_type: String,
        /// Environment name
        environment: String,
    },

    /// Anything else
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Failure raised by a scheduled agent
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Repository read/write failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Agent-specific failure
    #[error("agent {agent} failed: {message}")]
    Failed {
        /// Agent lock name
        agent: String,
        /// Failure message
        message: String,
    },
}

/// Settings loading failure
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("failed to read settings from {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for the settings schema
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_errors_are_classified() {
        assert_eq!(
            PluginError::CurrentlyUnresolvable("image not built".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            PluginError::user("InvalidSpec", "bad port").class(),
            ErrorClass::User
        );
        let system = PluginError::system("ConnectionReset", "peer went away");
        assert_eq!(system.class(), ErrorClass::System);
        assert_eq!(system.error_type(), "ConnectionReset");
        assert_eq!(system.message(), "peer went away");
        assert_eq!(system.to_string(), "ConnectionReset: peer went away");
    }

    #[test]
    fn not_found_formats_entity_and_key() {
        let err = RepositoryError::not_found("delivery config", "fnord-manifest");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "delivery config not found: fnord-manifest");
    }
}
