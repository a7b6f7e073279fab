//! Outcome reports of multi-step operations
//!
//! Steps that may fail without aborting the operation are recorded here so
//! callers can see partial failure.

use serde::{Deserialize, Serialize};

/// A non-fatal problem during deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployWarning {
    /// Deployment step that failed, e.g. "form_config_upload"
    pub step: String,
    pub message: String,
}

impl DeployWarning {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Result of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReport {
    pub workflow_id: String,
    #[serde(default)]
    pub warnings: Vec<DeployWarning>,
}

impl DeployReport {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            warnings: Vec::new(),
        }
    }

    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A failed removal of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalFailure {
    /// Instance id or artifact path
    pub target: String,
    pub message: String,
}

impl RemovalFailure {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Result of a delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub workflow_id: String,

    /// Non-empty instance pages processed while draining
    pub drain_rounds: usize,

    pub instances_deleted: usize,

    pub instance_failures: Vec<RemovalFailure>,

    /// Paths of removed artifacts
    pub removed: Vec<String>,

    /// Paths of artifacts that did not exist
    pub missing: Vec<String>,

    pub failed: Vec<RemovalFailure>,

    pub module_removed: bool,

    pub module_error: Option<String>,
}

impl DeleteReport {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }

    /// Whether everything that existed was removed
    pub fn is_complete(&self) -> bool {
        self.instance_failures.is_empty() && self.failed.is_empty() && self.module_removed
    }
}

/// Result of replacing a deployed workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeployReport {
    pub deleted: DeleteReport,
    pub deployed: DeployReport,
}
