//! Kickstart Model
//!
//! Workflow definitions as authored in the kickstart editor, plus the read-model
//! summaries returned by deployment queries.

use thiserror::Error;

pub mod info;
pub mod workflow;

pub use info::WorkflowInfo;
pub use workflow::{
    FormDefinition, FormProperty, ScriptTask, Task, TaskKind, UserTask, WorkflowDefinition,
};

/// Errors raised while validating a workflow model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The workflow definition is structurally invalid
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The JSON source could not be parsed into a workflow
    #[error("Invalid workflow source: {0}")]
    InvalidSource(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::InvalidSource(err.to_string())
    }
}
