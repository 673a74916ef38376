use thiserror::Error;

use crate::types::VersionTagError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error during {operation} ({stage}): {details}")]
    NetworkError {
        operation: &'static str,
        stage: NetworkStage,
        details: String,
    },

    #[error("Archive for {version} failed validation: {details}")]
    ValidationFailed { version: String, details: String },

    #[error("Extraction of {version} failed: {details}")]
    ExtractionFailed { version: String, details: String },

    #[error("Version not found: {version}")]
    VersionNotFound { version: String },

    #[error("Unknown runtime: {name}")]
    UnknownRuntime { name: String },

    #[error("Runtime registered twice: {name}")]
    DuplicateRuntime { name: String },

    #[error("Permission denied during {operation}: {details}")]
    PermissionDenied {
        operation: &'static str,
        details: String,
    },

    #[error("An install of {version} is already in progress")]
    InstallInProgress { version: String },

    #[error(transparent)]
    InvalidVersion(#[from] VersionTagError),

    #[error("Environment store error during {operation}: {details}")]
    EnvironmentStore {
        operation: &'static str,
        details: String,
    },

    #[error("IO error ({kind}): {message}")]
    IoError {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("{primary} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        primary: Box<BackendError>,
        cleanup: String,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStage {
    #[error("request")]
    Request,
    #[error("response parse")]
    ResponseParse,
}

/// Coarse failure category a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Validation,
    Extraction,
    NotFound,
    Permission,
    Other,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Extraction => "extraction",
            Self::NotFound => "not-found",
            Self::Permission => "permission",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackendError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError { .. } => ErrorKind::Network,
            Self::ValidationFailed { .. } => ErrorKind::Validation,
            Self::ExtractionFailed { .. } => ErrorKind::Extraction,
            Self::VersionNotFound { .. } | Self::UnknownRuntime { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::IoError { kind, .. } if *kind == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::Permission
            }
            Self::CleanupFailed { primary, .. } => primary.kind(),
            Self::InstallInProgress { .. }
            | Self::DuplicateRuntime { .. }
            | Self::InvalidVersion(_)
            | Self::EnvironmentStore { .. }
            | Self::IoError { .. } => ErrorKind::Other,
        }
    }

    /// Network and validation failures may succeed on a fresh attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Validation)
    }

    pub fn network_request(operation: &'static str, details: impl Into<String>) -> Self {
        Self::NetworkError {
            operation,
            stage: NetworkStage::Request,
            details: details.into(),
        }
    }

    pub fn network_parse(operation: &'static str, details: impl Into<String>) -> Self {
        Self::NetworkError {
            operation,
            stage: NetworkStage::ResponseParse,
            details: details.into(),
        }
    }

    pub fn network_parse_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network_parse(operation, error.to_string())
    }

    pub fn validation(version: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ValidationFailed {
            version: version.into(),
            details: details.into(),
        }
    }

    pub fn extraction(version: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            version: version.into(),
            details: details.into(),
        }
    }

    pub fn not_found(version: impl Into<String>) -> Self {
        Self::VersionNotFound {
            version: version.into(),
        }
    }

    /// Maps an I/O failure, keeping permission problems in their own category.
    pub fn io_during(operation: &'static str, error: &std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                operation,
                details: error.to_string(),
            }
        } else {
            Self::IoError {
                kind: error.kind(),
                message: format!("{operation}: {error}"),
            }
        }
    }

    #[must_use]
    pub fn with_cleanup_failure(self, cleanup: impl std::fmt::Display) -> Self {
        Self::CleanupFailed {
            primary: Box::new(self),
            cleanup: cleanup.to_string(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendError, ErrorKind, NetworkStage};

    #[test]
    fn io_error_conversion_maps_to_io_variant() {
        let mapped = BackendError::from(std::io::Error::other("disk full"));
        assert!(
            matches!(mapped, BackendError::IoError { kind, ref message } if kind == std::io::ErrorKind::Other && message.contains("disk full"))
        );
    }

    #[test]
    fn io_during_maps_permission_denied_to_permission_kind() {
        let error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "go.exe is locked");
        let mapped = BackendError::io_during("uninstall", &error);

        assert!(matches!(
            mapped,
            BackendError::PermissionDenied {
                operation: "uninstall",
                ..
            }
        ));
        assert_eq!(mapped.kind(), ErrorKind::Permission);
        assert!(mapped.to_string().contains("go.exe is locked"));
    }

    #[test]
    fn network_helpers_set_expected_stage() {
        let request = BackendError::network_request("list remote", "timed out");
        assert!(matches!(
            request,
            BackendError::NetworkError {
                operation: "list remote",
                stage: NetworkStage::Request,
                ..
            }
        ));

        let parse = BackendError::network_parse("list remote", "invalid json");
        assert!(matches!(
            parse,
            BackendError::NetworkError {
                stage: NetworkStage::ResponseParse,
                ..
            }
        ));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            BackendError::network_request("install", "boom").kind(),
            ErrorKind::Network
        );
        assert_eq!(
            BackendError::validation("v1", "crc").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BackendError::extraction("v1", "disk full").kind(),
            ErrorKind::Extraction
        );
        assert_eq!(BackendError::not_found("v1").kind(), ErrorKind::NotFound);
        assert_eq!(
            BackendError::UnknownRuntime {
                name: "ruby".to_string()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn only_network_and_validation_are_retryable() {
        assert!(BackendError::network_request("install", "reset").is_retryable());
        assert!(BackendError::validation("v1", "truncated").is_retryable());
        assert!(!BackendError::extraction("v1", "disk full").is_retryable());
        assert!(!BackendError::not_found("v1").is_retryable());
    }

    #[test]
    fn cleanup_failure_reports_both_errors_and_keeps_kind() {
        let error = BackendError::extraction("v1", "disk full").with_cleanup_failure("locked");

        assert_eq!(error.kind(), ErrorKind::Extraction);
        let message = error.to_string();
        assert!(message.contains("disk full"));
        assert!(message.contains("locked"));
    }
}
