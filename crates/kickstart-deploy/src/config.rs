//! Deployment configuration
//!
//! Remote locations, credentials and limits used by the deployment service.
//! Values are loaded by the server from the environment; every field has a
//! default matching a local Alfresco/Share installation.

use kickstart_repository::BasicAuth;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KickstartError, KickstartResult};

/// Deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Content repository location; `memory://` selects the in-memory repository
    #[serde(default = "default_repository_url")]
    pub repository_url: String,

    #[serde(default = "default_user")]
    pub repository_user: String,

    #[serde(default = "default_password")]
    pub repository_password: String,

    /// Base URL of the workflow engine REST services
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// Base URL of the Share application hosting form modules
    #[serde(default = "default_share_url")]
    pub share_url: String,

    /// Account used for the form module endpoints
    #[serde(default = "default_user")]
    pub module_user: String,

    #[serde(default = "default_password")]
    pub module_password: String,

    #[serde(default = "default_workflow_definition_folder")]
    pub workflow_definition_folder: String,

    #[serde(default = "default_data_dictionary_folder")]
    pub data_dictionary_folder: String,

    /// Account every user task is assigned to at deploy time
    #[serde(default = "default_assignee")]
    pub default_assignee: String,

    /// Instances fetched per drain round
    #[serde(default = "default_drain_page_size")]
    pub drain_page_size: u32,

    /// Upper bound on drain rounds before a delete gives up
    #[serde(default = "default_max_drain_rounds")]
    pub max_drain_rounds: usize,

    /// Transport timeout of remote calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Directory overriding the built-in templates
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

fn default_repository_url() -> String {
    "memory://".to_string()
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_engine_url() -> String {
    "http://localhost:8080/alfresco/service/".to_string()
}

fn default_share_url() -> String {
    "http://localhost:8081/share/".to_string()
}

fn default_workflow_definition_folder() -> String {
    "/Data Dictionary/Workflow Definitions".to_string()
}

fn default_data_dictionary_folder() -> String {
    "/Data Dictionary/Models".to_string()
}

fn default_assignee() -> String {
    "admin".to_string()
}

fn default_drain_page_size() -> u32 {
    50
}

fn default_max_drain_rounds() -> usize {
    100
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            repository_url: default_repository_url(),
            repository_user: default_user(),
            repository_password: default_password(),
            engine_url: default_engine_url(),
            share_url: default_share_url(),
            module_user: default_user(),
            module_password: default_password(),
            workflow_definition_folder: default_workflow_definition_folder(),
            data_dictionary_folder: default_data_dictionary_folder(),
            default_assignee: default_assignee(),
            drain_page_size: default_drain_page_size(),
            max_drain_rounds: default_max_drain_rounds(),
            http_timeout_secs: default_http_timeout_secs(),
            template_dir: None,
        }
    }
}

/// Endpoint URL under a base, one encoded segment per element of `segments`
fn endpoint(base: &str, segments: &[&str]) -> KickstartResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| KickstartError::Configuration(format!("Invalid URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| KickstartError::Configuration(format!("URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl DeployConfig {
    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> KickstartResult<()> {
        for (name, value) in [
            ("repository URL", &self.repository_url),
            ("engine URL", &self.engine_url),
            ("share URL", &self.share_url),
            ("workflow definition folder", &self.workflow_definition_folder),
            ("data dictionary folder", &self.data_dictionary_folder),
            ("default assignee", &self.default_assignee),
        ] {
            if value.trim().is_empty() {
                return Err(KickstartError::Configuration(format!("{} must not be empty", name)));
            }
        }
        if self.drain_page_size == 0 {
            return Err(KickstartError::Configuration(
                "Drain page size must be at least 1".to_string(),
            ));
        }
        if self.max_drain_rounds == 0 {
            return Err(KickstartError::Configuration(
                "Max drain rounds must be at least 1".to_string(),
            ));
        }
        endpoint(&self.engine_url, &[])?;
        endpoint(&self.share_url, &[])?;
        Ok(())
    }

    /// Whether the in-memory repository is selected
    pub fn uses_memory_repository(&self) -> bool {
        self.repository_url.starts_with("memory://")
    }

    /// Credentials for the repository and the engine REST services
    pub fn repository_auth(&self) -> BasicAuth {
        BasicAuth::new(&self.repository_user, &self.repository_password)
    }

    /// Credentials for the form module endpoints
    pub fn module_auth(&self) -> BasicAuth {
        BasicAuth::new(&self.module_user, &self.module_password)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn module_upload_url(&self) -> KickstartResult<String> {
        Ok(endpoint(&self.share_url, &["page", "modules", "module"])?.into())
    }

    pub fn module_delete_url(&self, module_id: &str) -> KickstartResult<String> {
        let mut url = endpoint(&self.share_url, &["page", "modules", "module", "delete"])?;
        url.query_pairs_mut().append_pair("moduleId", module_id);
        Ok(url.into())
    }

    /// Query URL for active instances of a workflow
    pub fn instances_url(
        &self,
        workflow_id: &str,
        max_items: u32,
        skip_count: u32,
    ) -> KickstartResult<String> {
        let mut url = endpoint(&self.engine_url, &["api", "workflow-instances"])?;
        url.query_pairs_mut()
            .append_pair("state", "active")
            .append_pair("definitionName", &format!("activiti${}", workflow_id))
            .append_pair("maxItems", &max_items.to_string())
            .append_pair("skipCount", &skip_count.to_string());
        Ok(url.into())
    }

    /// Forced-delete URL of one instance
    pub fn instance_delete_url(&self, instance_id: &str) -> KickstartResult<String> {
        let mut url = endpoint(&self.engine_url, &["api", "workflow-instances", instance_id])?;
        url.query_pairs_mut().append_pair("forced", "true");
        Ok(url.into())
    }
}
