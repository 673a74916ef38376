use switchyard_backend::{BackendError, ErrorKind};
use switchyard_core::ClientBuildError;
use switchyard_platform::{AppPathsError, PathEditError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Paths(#[from] AppPathsError),

    #[error(transparent)]
    HttpClient(#[from] ClientBuildError),

    #[error(transparent)]
    PathStore(#[from] PathEditError),

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),
}

impl CliError {
    /// Taxonomy label printed in front of the message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend(error) => error.kind(),
            Self::PathStore(error) if error.is_permission_denied() => ErrorKind::Permission,
            Self::HttpClient(_) => ErrorKind::Network,
            Self::Paths(_) | Self::PathStore(_) | Self::UnsupportedHost(_) => ErrorKind::Other,
        }
    }
}
