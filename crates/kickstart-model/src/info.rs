//! Read-model summaries of deployed workflows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a deployed workflow, built fresh for every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    /// Deployment id (the base name of the workflow's artifacts)
    pub id: String,

    /// Human-readable name, as stored on the process document
    pub name: String,

    /// When the process document was created in the repository
    pub create_time: DateTime<Utc>,

    /// Number of active runtime instances, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_instance_count: Option<u64>,
}
