//! Error types for workflow deployment

use kickstart_repository::RepositoryError;
use thiserror::Error;

use crate::template::TemplateError;

/// Errors surfaced to callers of the deployment service
#[derive(Error, Debug)]
pub enum KickstartError {
    /// A required metadata entry was not supplied
    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    /// The workflow is already deployed under this id
    #[error("Workflow {0} is already deployed (redeploy or delete it first)")]
    AlreadyDeployed(String),

    /// Invalid workflow definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template loading or rendering failed
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// The requested operation mode is not supported
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Workflow or artifact not found
    #[error("{0} not found")]
    NotFound(String),

    /// Runtime instances could not be drained
    #[error("Could not drain instances of {workflow_id} after {rounds} rounds ({remaining} still active)")]
    DrainIncomplete {
        workflow_id: String,
        rounds: usize,
        remaining: u64,
    },

    /// Process or diagram generation failed
    #[error("Rendering error: {0}")]
    Render(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote repository or engine call failed
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result type for deployment operations
pub type KickstartResult<T> = Result<T, KickstartError>;

impl From<kickstart_model::ModelError> for KickstartError {
    fn from(err: kickstart_model::ModelError) -> Self {
        match err {
            kickstart_model::ModelError::ValidationError(msg) => KickstartError::Validation(msg),
            other => KickstartError::Validation(other.to_string()),
        }
    }
}

impl From<std::fmt::Error> for KickstartError {
    fn from(err: std::fmt::Error) -> Self {
        KickstartError::Render(err.to_string())
    }
}

impl KickstartError {
    /// Whether the error reports a missing workflow or artifact
    pub fn is_not_found(&self) -> bool {
        match self {
            KickstartError::NotFound(_) => true,
            KickstartError::Repository(err) => err.is_not_found(),
            _ => false,
        }
    }
}
