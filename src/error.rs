//! Error types for the IaaS control client.
//!
//! Every failure in the crate ends up as an [`IaasError`]. The API layer
//! classifies remote failures into the four kinds callers care about
//! (see [`ErrorKind`]); configuration, state and reconciliation failures
//! keep their own enums so the CLI can report them precisely.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the IaaS control client.
#[derive(Debug, Error)]
pub enum IaasError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised by the API layer.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an error, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input caught before any remote call.
    Validation,
    /// The remote call could not be completed.
    Transport,
    /// The provider answered with a failure status.
    RemoteRejected,
    /// A lookup found nothing.
    NotFound,
    /// Anything else (state files, IO, internal invariants).
    Internal,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Errors raised while talking to the IaaS API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected locally, no request was issued.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Offending parameter.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The request could not be completed.
    #[error("Transport failure: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The provider returned a non-success status.
    #[error("Request rejected by provider: {status} - {message}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Provider message, or the raw body when none could be extracted.
        message: String,
    },

    /// A lookup matched nothing.
    #[error("{resource} not found: {name}")]
    NotFound {
        /// Kind of resource looked up.
        resource: String,
        /// Selector that matched nothing.
        name: String,
    },

    /// The provider answered with a body that could not be decoded.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the decoding failure.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A field that cannot change in place was changed.
    #[error("Changing {field} of {resource} from '{from}' to '{to}' requires replacing the resource")]
    ReplacementRequired {
        /// Resource address.
        resource: String,
        /// Immutable field.
        field: String,
        /// Last applied value.
        from: String,
        /// Desired value.
        to: String,
    },

    /// An operation needed a tracked identifier that is not set.
    #[error("{resource} has no tracked identifier")]
    MissingId {
        /// Resource address.
        resource: String,
    },
}

/// Result type alias for IaaS operations.
pub type Result<T> = std::result::Result<T, IaasError>;

impl IaasError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(api) => api.kind(),
            Self::Config(ConfigError::ValidationError { .. } | ConfigError::MissingEnvVar { .. })
            | Self::Reconcile(ReconcileError::ReplacementRequired { .. } | ReconcileError::MissingId { .. }) => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Internal,
        }
    }
}

impl ApiError {
    /// Creates a validation error for the given parameter.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a remote rejection.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. } | Self::InvalidResponse { .. } => ErrorKind::Transport,
            Self::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::RemoteRejected => "remote_rejected",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        };
        write!(f, "{kind}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_kinds() {
        assert_eq!(ApiError::validation("region", "unknown").kind(), ErrorKind::Validation);
        assert_eq!(ApiError::transport("reset").kind(), ErrorKind::Transport);
        assert_eq!(ApiError::rejected(409, "busy").kind(), ErrorKind::RemoteRejected);
        assert_eq!(ApiError::not_found("image", "x").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_wrapped_kinds() {
        let err = IaasError::from(ApiError::rejected(500, "boom"));
        assert_eq!(err.kind(), ErrorKind::RemoteRejected);

        let err = IaasError::from(ReconcileError::ReplacementRequired {
            resource: String::from("server.web"),
            field: String::from("region"),
            from: String::from("ir-thr-c2"),
            to: String::from("nl-ams-1"),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(IaasError::internal("x").kind(), ErrorKind::Internal);
    }
}
