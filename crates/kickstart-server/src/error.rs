//! Error types for the Kickstart Server

use kickstart_deploy::KickstartError;
use kickstart_repository::RepositoryError;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failure while wiring up the deployment service
    #[error("Startup error: {0}")]
    StartupError(String),

    /// Deployment service error
    #[error(transparent)]
    Kickstart(#[from] KickstartError),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<RepositoryError> for ServerError {
    fn from(err: RepositoryError) -> Self {
        ServerError::StartupError(format!("Repository: {}", err))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}
