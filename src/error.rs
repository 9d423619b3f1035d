//! Error types for the PowerStore provider
//!
//! Every lifecycle failure falls in one of three categories: local
//! validation (reported before any remote call), remote call failures, and
//! refresh failures (the read-back after a successful mutation).

use thiserror::Error;

/// Unified error type for the provider
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Schema validators, immutability and mutually-exclusive field checks.
    #[error("{summary}: {detail}")]
    Validation { summary: String, detail: String },

    /// A create/modify/delete/get call against the array failed.
    #[error("{summary}: {detail}")]
    Operation { summary: String, detail: String },

    /// The get-by-id after a successful create or update failed.
    #[error("{summary}: {detail}")]
    Refresh { summary: String, detail: String },

    #[error("Unknown {kind} type: {name}")]
    UnknownType { kind: String, name: String },

    // =========================================================================
    // Array API Errors
    // =========================================================================
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("PowerStore API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid pagination header: {0}")]
    Pagination(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Capacity unit error: {0}")]
    CapacityUnit(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category an error is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected locally, nothing was sent to the array
    Validation,
    /// The remote call failed, the array state is unchanged or unknown
    Remote,
    /// The mutation succeeded but the follow-up read failed
    Refresh,
    /// Unknown resource type, IO, or other host-side failure
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Remote => write!(f, "remote"),
            ErrorCategory::Refresh => write!(f, "refresh"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Local validation failure
    pub fn validation(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Validation {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Remote call failure, `prefix` is followed by the underlying error text
    pub fn operation(summary: impl Into<String>, prefix: &str, source: &Error) -> Self {
        Error::Operation {
            summary: summary.into(),
            detail: format!("{}{}", prefix, source),
        }
    }

    /// Remote call failure with a fully formed detail message
    pub fn operation_msg(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Operation {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Read-back failure after a successful mutation
    pub fn refresh(summary: impl Into<String>, prefix: &str, source: &Error) -> Self {
        Error::Refresh {
            summary: summary.into(),
            detail: format!("{}{}", prefix, source),
        }
    }

    /// Determine which category this error is reported under
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation { .. } | Error::CapacityUnit(_) => ErrorCategory::Validation,

            Error::Operation { .. }
            | Error::NotFound { .. }
            | Error::Api { .. }
            | Error::Authentication(_)
            | Error::Pagination(_)
            | Error::Http(_) => ErrorCategory::Remote,

            Error::Refresh { .. } => ErrorCategory::Refresh,

            _ => ErrorCategory::Internal,
        }
    }

    /// Summary line for diagnostics
    pub fn summary(&self) -> String {
        match self {
            Error::Validation { summary, .. }
            | Error::Operation { summary, .. }
            | Error::Refresh { summary, .. } => summary.clone(),
            other => match other.category() {
                ErrorCategory::Validation => "Invalid Attribute Value".to_string(),
                ErrorCategory::Remote => "PowerStore API Error".to_string(),
                _ => "Provider Error".to_string(),
            },
        }
    }

    /// Detail line for diagnostics
    pub fn detail(&self) -> String {
        match self {
            Error::Validation { detail, .. }
            | Error::Operation { detail, .. }
            | Error::Refresh { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Check whether the array reported the entity as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Api { status: 404, .. })
    }

    /// Lifecycle errors are terminal, nothing is retried
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for the provider
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = Error::validation("Error updating file system", "Name of the file system can't be updated");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(
            err.to_string(),
            "Error updating file system: Name of the file system can't be updated"
        );

        let api = Error::Api {
            status: 422,
            message: "name already in use".into(),
        };
        assert_eq!(api.category(), ErrorCategory::Remote);

        let op = Error::operation(
            "Error creating file system",
            "Could not create file system, unexpected error: ",
            &api,
        );
        assert_eq!(op.category(), ErrorCategory::Remote);
        assert!(op.detail().starts_with("Could not create file system, unexpected error: "));
        assert!(op.detail().contains("name already in use"));

        let refresh = Error::refresh(
            "Error getting file system after creation",
            "Could not get file system, unexpected error: ",
            &api,
        );
        assert_eq!(refresh.category(), ErrorCategory::Refresh);
    }

    #[test]
    fn test_not_found_and_retry() {
        let err = Error::NotFound {
            kind: "file_system".into(),
            id: "missing".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(err.summary(), "PowerStore API Error");

        let cfg = Error::Configuration("bad".into());
        assert_eq!(cfg.category(), ErrorCategory::Internal);
        assert!(!cfg.is_not_found());
    }
}
