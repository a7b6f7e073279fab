//! Artifact naming
//!
//! Every document created for a workflow is named off a single base name
//! derived from the workflow's display name.

use uuid::Uuid;

use crate::error::{KickstartError, KickstartResult};

/// Namespace token of generated model identifiers
pub const KICKSTART_PREFIX: &str = "ks:";

/// Suffix of process definition documents
pub const BPMN_SUFFIX: &str = ".bpmn20.xml";

/// Prefix of form-config module ids
pub const FORM_CONFIG_MODULE_PREFIX: &str = "kickstart_form_";

/// Base name of a workflow: lower case, spaces replaced by underscores
pub fn base_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Check that a workflow id names documents inside its folder
///
/// Ids are joined into repository paths, so separators and parent
/// references are refused.
pub fn validate_workflow_id(workflow_id: &str) -> KickstartResult<()> {
    if workflow_id.is_empty() {
        return Err(KickstartError::Validation("Workflow id must not be empty".to_string()));
    }
    if workflow_id.contains('/') || workflow_id.contains('\\') || workflow_id.contains("..") {
        return Err(KickstartError::Validation(format!(
            "Invalid workflow id '{}'",
            workflow_id
        )));
    }
    Ok(())
}

pub fn bpmn_file_name(base: &str) -> String {
    format!("{}{}", base, BPMN_SUFFIX)
}

pub fn diagram_file_name(base: &str) -> String {
    format!("{}.png", base)
}

/// Diagram name used by older deployments
pub fn legacy_diagram_file_name(base: &str) -> String {
    format!("{}_image.png", base)
}

pub fn json_file_name(base: &str) -> String {
    format!("{}.json", base)
}

pub fn task_model_file_name(base: &str) -> String {
    format!("{}-task-model.xml", base)
}

pub fn form_config_file_name(base: &str) -> String {
    format!("{}-form-config.xml", base)
}

pub fn form_config_module_id(base: &str) -> String {
    format!("{}{}", FORM_CONFIG_MODULE_PREFIX, base)
}

/// Recover the base name from a process document name
///
/// Names without the process suffix are returned unchanged.
pub fn base_name_from_bpmn_file_name(file_name: &str) -> String {
    file_name
        .strip_suffix(BPMN_SUFFIX)
        .unwrap_or(file_name)
        .to_string()
}

/// Repository-safe identifier of a form property
pub fn friendly_name(property: &str) -> String {
    format!("{}{}", KICKSTART_PREFIX, base_name(property))
}

/// A fresh, unique form key
pub fn new_form_key() -> String {
    format!("{}{}", KICKSTART_PREFIX, Uuid::new_v4())
}
