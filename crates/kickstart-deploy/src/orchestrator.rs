//! Deployment orchestration
//!
//! Coordinates the content repository and the workflow engine to deploy,
//! inspect and remove kickstart workflows. Every workflow is stored as a set
//! of documents named off its base name:
//!
//! | Document | Folder |
//! |---|---|
//! | `<id>-task-model.xml` | data dictionary |
//! | `<id>-form-config.xml` | workflow definitions |
//! | `<id>.png` | workflow definitions |
//! | `<id>.json` | workflow definitions |
//! | `<id>.bpmn20.xml` | workflow definitions |
//!
//! Calls for the same workflow id are serialized; different ids proceed
//! independently.

use dashmap::DashMap;
use kickstart_model::{WorkflowDefinition, WorkflowInfo};
use kickstart_repository::{
    join_path, DocumentQuery, DocumentRepository, HttpApi, NewDocument, RepositoryError,
    PROPERTY_DESCRIPTION, PROPERTY_OBJECT_TYPE_ID,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::diagram::{is_png, DiagramRenderer};
use crate::error::{KickstartError, KickstartResult};
use crate::forms::FormArtifactGenerator;
use crate::marshal::ProcessMarshaller;
use crate::naming::{
    base_name, base_name_from_bpmn_file_name, bpmn_file_name, diagram_file_name,
    form_config_file_name, form_config_module_id, json_file_name, legacy_diagram_file_name,
    task_model_file_name, validate_workflow_id, BPMN_SUFFIX,
};
use crate::report::{DeleteReport, DeployReport, DeployWarning, RedeployReport, RemovalFailure};
use crate::template::{TemplateFields, TemplateName, TemplateRegistry};

/// Metadata entry carrying the editor's JSON source of a workflow
pub const METADATA_JSON_SOURCE: &str = "workflow_json_source";

const MODEL_OBJECT_TYPE: &str = "D:cm:dictionaryModel";
const PROCESS_OBJECT_TYPE: &str = "D:bpm:workflowDefinition,P:cm:titled";
const ENGINE_ID: &str = "activiti";

/// Stored documents that can be read back for a deployed workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    /// The editor's JSON source
    JsonSource,
    /// The form configuration copy
    FormConfig,
    /// The process definition XML
    ProcessDefinition,
}

impl MetadataKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::JsonSource => METADATA_JSON_SOURCE,
            MetadataKey::FormConfig => "form_config",
            MetadataKey::ProcessDefinition => "process_definition",
        }
    }

    /// Document name holding this entry for a workflow
    pub fn file_name(self, workflow_id: &str) -> String {
        match self {
            MetadataKey::JsonSource => json_file_name(workflow_id),
            MetadataKey::FormConfig => form_config_file_name(workflow_id),
            MetadataKey::ProcessDefinition => bpmn_file_name(workflow_id),
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataKey {
    type Err = KickstartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            METADATA_JSON_SOURCE => Ok(MetadataKey::JsonSource),
            "form_config" => Ok(MetadataKey::FormConfig),
            "process_definition" => Ok(MetadataKey::ProcessDefinition),
            other => Err(KickstartError::Validation(format!("Unknown metadata key '{}'", other))),
        }
    }
}

/// Page of active instances returned by the engine
#[derive(Debug, Deserialize)]
struct InstancePage {
    #[serde(default)]
    data: Vec<InstanceRef>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct InstanceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(rename = "totalItems")]
    total_items: u64,
}

impl InstancePage {
    fn remaining(&self) -> u64 {
        self.paging
            .as_ref()
            .map(|paging| paging.total_items)
            .unwrap_or(self.data.len() as u64)
    }
}

/// Exclusive hold on one workflow id
///
/// Releasing it drops the lock table entry unless another call is waiting.
struct WorkflowLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    workflow_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WorkflowLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.workflow_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Deploys and manages kickstart workflows
#[derive(Debug)]
pub struct KickstartService {
    /// Content repository holding the workflow documents
    repository: Arc<dyn DocumentRepository>,

    /// Engine and form module endpoints
    http: Arc<dyn HttpApi>,

    /// Process definition writer
    marshaller: Arc<dyn ProcessMarshaller>,

    templates: Arc<TemplateRegistry>,

    forms: FormArtifactGenerator,

    config: DeployConfig,

    /// One lock per workflow id
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KickstartService {
    /// Create a new service
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        http: Arc<dyn HttpApi>,
        marshaller: Arc<dyn ProcessMarshaller>,
        templates: Arc<TemplateRegistry>,
        config: DeployConfig,
    ) -> Self {
        Self {
            repository,
            http,
            marshaller,
            forms: FormArtifactGenerator::new(templates.clone()),
            templates,
            config,
            locks: DashMap::new(),
        }
    }

    /// Service configuration
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    async fn lock_workflow(&self, workflow_id: &str) -> WorkflowLock<'_> {
        let lock = Arc::clone(
            &self
                .locks
                .entry(workflow_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        WorkflowLock {
            locks: &self.locks,
            workflow_id: workflow_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn definition_path(&self, name: &str) -> String {
        join_path(&self.config.workflow_definition_folder, name)
    }

    fn model_path(&self, name: &str) -> String {
        join_path(&self.config.data_dictionary_folder, name)
    }

    /// Deploy a workflow
    ///
    /// Assigns the workflow id and the form keys of its user tasks. Failures
    /// of the form-config upload are reported as warnings; any other failure
    /// aborts the deployment, leaving earlier uploads in place.
    pub async fn deploy(
        &self,
        workflow: &mut WorkflowDefinition,
        metadata: &HashMap<String, String>,
        diagram: &dyn DiagramRenderer,
    ) -> KickstartResult<DeployReport> {
        let json_source = Self::check_deployable(workflow, metadata)?;
        let workflow_id = base_name(&workflow.name);
        validate_workflow_id(&workflow_id)?;

        let span = info_span!("deploy_workflow", %workflow_id);
        async move {
            let _lock = self.lock_workflow(&workflow_id).await;
            self.deploy_locked(workflow, json_source, diagram, workflow_id.clone())
                .await
        }
        .instrument(span)
        .await
    }

    /// Replace a deployed workflow: delete it, then deploy the new definition
    pub async fn redeploy(
        &self,
        workflow: &mut WorkflowDefinition,
        metadata: &HashMap<String, String>,
        diagram: &dyn DiagramRenderer,
    ) -> KickstartResult<RedeployReport> {
        let json_source = Self::check_deployable(workflow, metadata)?;
        let workflow_id = base_name(&workflow.name);
        validate_workflow_id(&workflow_id)?;

        let span = info_span!("redeploy_workflow", %workflow_id);
        async move {
            let _lock = self.lock_workflow(&workflow_id).await;

            let deleted = self.delete_locked(&workflow_id).await?;
            let deployed = self
                .deploy_locked(workflow, json_source, diagram, workflow_id.clone())
                .await?;
            Ok(RedeployReport { deleted, deployed })
        }
        .instrument(span)
        .await
    }

    /// Checks that need no remote call
    fn check_deployable<'a>(
        workflow: &WorkflowDefinition,
        metadata: &'a HashMap<String, String>,
    ) -> KickstartResult<&'a str> {
        let json_source = metadata
            .get(METADATA_JSON_SOURCE)
            .map(String::as_str)
            .ok_or_else(|| KickstartError::MissingMetadata(METADATA_JSON_SOURCE.to_string()))?;
        workflow.validate()?;
        for task in workflow.user_tasks() {
            FormArtifactGenerator::validate(task)?;
        }
        Ok(json_source)
    }

    async fn deploy_locked(
        &self,
        workflow: &mut WorkflowDefinition,
        json_source: &str,
        diagram: &dyn DiagramRenderer,
        workflow_id: String,
    ) -> KickstartResult<DeployReport> {
        info!("Deploying workflow");
        workflow.id = Some(workflow_id.clone());

        let definition_folder = self
            .repository
            .resolve_folder(&self.config.workflow_definition_folder)
            .await?;
        let model_folder = self
            .repository
            .resolve_folder(&self.config.data_dictionary_folder)
            .await?;

        // A deploy that failed midway leaves the task model without a process
        for path in [
            self.definition_path(&bpmn_file_name(&workflow_id)),
            self.model_path(&task_model_file_name(&workflow_id)),
        ] {
            if self.repository.exists(&path).await? {
                warn!(%path, "Workflow is already deployed");
                return Err(KickstartError::AlreadyDeployed(workflow_id));
            }
        }

        for task in workflow.user_tasks_mut() {
            task.assignee = Some(self.config.default_assignee.clone());
        }

        let artifacts = self.forms.generate_all(workflow)?;
        let mut report = DeployReport::new(&workflow_id);

        // The model must exist before the process document references its types
        let model_id = Uuid::new_v4().to_string();
        let task_model = self.templates.render(
            TemplateName::TaskModel,
            &TemplateFields::new()
                .text("model_id", &model_id)
                .fragment("types", artifacts.type_definition),
        )?;
        self.upload(
            &model_folder.path,
            NewDocument::new(task_model_file_name(&workflow_id), "application/xml", task_model.into_bytes())
                .with_property(PROPERTY_OBJECT_TYPE_ID, MODEL_OBJECT_TYPE)
                .with_property("cm:modelActive", true),
        )
        .await?;

        let form_config = self.templates.render(
            TemplateName::FormConfig,
            &TemplateFields::new()
                .text("module_id", form_config_module_id(&workflow_id))
                .text("workflow_id", &workflow_id)
                .fragment("evaluator_configs", artifacts.form_config),
        )?;
        if let Some(warning) = self.upload_form_config_module(&form_config).await {
            report.warnings.push(warning);
        }
        if let Err(err) = self
            .upload(
                &definition_folder.path,
                NewDocument::new(
                    form_config_file_name(&workflow_id),
                    "application/xml",
                    form_config.into_bytes(),
                ),
            )
            .await
        {
            warn!(?err, "Failed to store form config copy");
            report
                .warnings
                .push(DeployWarning::new("form_config_copy", err.to_string()));
        }

        let png = diagram.render(workflow)?;
        self.upload(
            &definition_folder.path,
            NewDocument::new(diagram_file_name(&workflow_id), "image/png", png),
        )
        .await?;

        self.upload(
            &definition_folder.path,
            NewDocument::new(
                json_file_name(&workflow_id),
                "application/json",
                json_source.as_bytes().to_vec(),
            ),
        )
        .await?;

        // Uploading into the definitions folder with these flags activates the process
        let process_xml = self.marshaller.marshal(workflow)?;
        self.upload(
            &definition_folder.path,
            NewDocument::new(bpmn_file_name(&workflow_id), "application/xml", process_xml.into_bytes())
                .with_property(PROPERTY_OBJECT_TYPE_ID, PROCESS_OBJECT_TYPE)
                .with_property("bpm:definitionDeployed", true)
                .with_property("bpm:engineId", ENGINE_ID)
                .with_property(PROPERTY_DESCRIPTION, workflow.name.as_str()),
        )
        .await?;

        info!(warnings = report.warnings.len(), "Workflow deployed");
        Ok(report)
    }

    async fn upload(&self, folder_path: &str, document: NewDocument) -> KickstartResult<()> {
        let name = document.name.clone();
        debug!(folder = %folder_path, %name, size = document.content.len(), "Uploading document");
        self.repository
            .create_document(folder_path, document)
            .await
            .map_err(|err| {
                error!(?err, folder = %folder_path, %name, "Upload failed");
                KickstartError::from(err)
            })?;
        Ok(())
    }

    /// POST the form config to the module endpoint; failure becomes a warning
    async fn upload_form_config_module(&self, form_config: &str) -> Option<DeployWarning> {
        let url = match self.config.module_upload_url() {
            Ok(url) => url,
            Err(err) => return Some(DeployWarning::new("form_config_upload", err.to_string())),
        };
        match self
            .http
            .post(&url, form_config.to_string(), "application/xml", &self.config.module_auth())
            .await
        {
            Ok(response) if response.is_success() => {
                debug!(status = response.status, "Form config module uploaded");
                None
            }
            Ok(response) => {
                warn!(status = response.status, body = %response.body, "Form config module upload rejected");
                Some(DeployWarning::new(
                    "form_config_upload",
                    format!("status {}: {}", response.status, response.body),
                ))
            }
            Err(err) => {
                warn!(?err, "Form config module upload failed");
                Some(DeployWarning::new("form_config_upload", err.to_string()))
            }
        }
    }

    /// Delete a workflow
    ///
    /// Drains active instances first; artifact removal only starts once the
    /// engine reports none left. Missing artifacts and failed removals are
    /// recorded in the report.
    pub async fn delete(&self, workflow_id: &str) -> KickstartResult<DeleteReport> {
        validate_workflow_id(workflow_id)?;
        let span = info_span!("delete_workflow", %workflow_id);
        async move {
            let _lock = self.lock_workflow(workflow_id).await;
            self.delete_locked(workflow_id).await
        }
        .instrument(span)
        .await
    }

    async fn delete_locked(&self, workflow_id: &str) -> KickstartResult<DeleteReport> {
        info!("Deleting workflow");
        let mut report = DeleteReport::new(workflow_id);
        let module_url = self
            .config
            .module_delete_url(&form_config_module_id(workflow_id))?;

        self.drain_instances(workflow_id, &mut report).await?;

        let artifacts = [
            self.definition_path(&diagram_file_name(workflow_id)),
            self.definition_path(&legacy_diagram_file_name(workflow_id)),
            self.definition_path(&json_file_name(workflow_id)),
            self.definition_path(&form_config_file_name(workflow_id)),
            self.definition_path(&bpmn_file_name(workflow_id)),
            self.model_path(&task_model_file_name(workflow_id)),
        ];
        for path in artifacts {
            match self.repository.delete_document(&path, true).await {
                Ok(()) => {
                    info!(%path, "Removed document");
                    report.removed.push(path);
                }
                Err(err) if err.is_not_found() => {
                    debug!(%path, "Document not present");
                    report.missing.push(path);
                }
                Err(err) => {
                    warn!(?err, %path, "Failed to remove document");
                    report.failed.push(RemovalFailure::new(path, err.to_string()));
                }
            }
        }

        match self.http.get(&module_url, &self.config.module_auth()).await {
            Ok(response) if response.is_success() => report.module_removed = true,
            Ok(response) => {
                warn!(status = response.status, "Form config module removal rejected");
                report.module_error = Some(format!("status {}: {}", response.status, response.body));
            }
            Err(err) => {
                warn!(?err, "Form config module removal failed");
                report.module_error = Some(err.to_string());
            }
        }

        info!(
            rounds = report.drain_rounds,
            instances = report.instances_deleted,
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Workflow deleted"
        );
        Ok(report)
    }

    /// Force-delete active instances page by page until none are left
    async fn drain_instances(&self, workflow_id: &str, report: &mut DeleteReport) -> KickstartResult<()> {
        let auth = self.config.repository_auth();
        loop {
            let page = self
                .query_instances(workflow_id, self.config.drain_page_size)
                .await?;
            if page.data.is_empty() {
                return Ok(());
            }
            if report.drain_rounds >= self.config.max_drain_rounds {
                error!(rounds = report.drain_rounds, "Instances did not drain");
                return Err(KickstartError::DrainIncomplete {
                    workflow_id: workflow_id.to_string(),
                    rounds: report.drain_rounds,
                    remaining: page.remaining(),
                });
            }

            report.drain_rounds += 1;
            debug!(round = report.drain_rounds, instances = page.data.len(), "Draining instances");

            for instance in page.data {
                let url = self.config.instance_delete_url(&instance.id)?;
                match self.http.delete(&url, &auth).await {
                    Ok(response) if response.is_success() => report.instances_deleted += 1,
                    Ok(response) => {
                        warn!(instance = %instance.id, status = response.status, "Instance delete rejected");
                        report.instance_failures.push(RemovalFailure::new(
                            instance.id,
                            format!("status {}: {}", response.status, response.body),
                        ));
                    }
                    Err(err) => {
                        warn!(instance = %instance.id, ?err, "Instance delete failed");
                        report
                            .instance_failures
                            .push(RemovalFailure::new(instance.id, err.to_string()));
                    }
                }
            }
        }
    }

    async fn query_instances(&self, workflow_id: &str, max_items: u32) -> KickstartResult<InstancePage> {
        let url = self.config.instances_url(workflow_id, max_items, 0)?;
        debug!(%url, "Querying active instances");
        let response = self
            .http
            .get(&url, &self.config.repository_auth())
            .await?
            .error_for_status()?;
        let page = serde_json::from_str(&response.body).map_err(RepositoryError::from)?;
        Ok(page)
    }

    /// List deployed workflows, ordered by process document name
    ///
    /// Instance counts would cost one engine call per workflow and are not
    /// supported here.
    pub async fn list(&self, include_counts: bool) -> KickstartResult<Vec<WorkflowInfo>> {
        if include_counts {
            return Err(KickstartError::Unsupported(
                "Instance counts are not available when listing workflows".to_string(),
            ));
        }

        let folder = self
            .repository
            .resolve_folder(&self.config.workflow_definition_folder)
            .await?;
        let query = DocumentQuery::new(folder.id, BPMN_SUFFIX);
        let rows = self.repository.query(&query).await?;
        debug!(count = rows.len(), "Listed workflows");

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = base_name_from_bpmn_file_name(&row.name);
                WorkflowInfo {
                    name: row.description.unwrap_or_else(|| id.clone()),
                    id,
                    create_time: row.creation_date,
                    runtime_instance_count: None,
                }
            })
            .collect())
    }

    /// Get a deployed workflow, optionally with its active instance count
    pub async fn get(&self, workflow_id: &str, include_counts: bool) -> KickstartResult<WorkflowInfo> {
        validate_workflow_id(workflow_id)?;
        let path = self.definition_path(&bpmn_file_name(workflow_id));
        let document = self
            .repository
            .resolve_document(&path)
            .await
            .map_err(|err| not_found_as(err, format!("Workflow {}", workflow_id)))?;

        let id = base_name_from_bpmn_file_name(&document.name);
        let mut info = WorkflowInfo {
            name: document.description.unwrap_or_else(|| id.clone()),
            id,
            create_time: document.creation_date,
            runtime_instance_count: None,
        };

        if include_counts {
            let page = self.query_instances(&info.id, 1).await?;
            let paging = page.paging.ok_or_else(|| {
                RepositoryError::InvalidResponse("Instance query returned no paging".to_string())
            })?;
            info.runtime_instance_count = Some(paging.total_items);
        }

        Ok(info)
    }

    /// Read back a stored document of a deployed workflow
    pub async fn workflow_metadata(&self, workflow_id: &str, key: MetadataKey) -> KickstartResult<String> {
        validate_workflow_id(workflow_id)?;
        let path = self.definition_path(&key.file_name(workflow_id));
        let content = self
            .repository
            .get_content(&path)
            .await
            .map_err(|err| not_found_as(err, format!("Metadata {} of workflow {}", key, workflow_id)))?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Diagram of a deployed workflow
    ///
    /// Falls back to the legacy diagram name used by older deployments.
    pub async fn process_image(&self, workflow_id: &str) -> KickstartResult<Vec<u8>> {
        validate_workflow_id(workflow_id)?;
        let canonical = self.definition_path(&diagram_file_name(workflow_id));
        match self.repository.get_content(&canonical).await {
            Ok(png) => return Ok(png),
            Err(err) if err.is_not_found() => {
                debug!(%workflow_id, "No diagram under canonical name, trying legacy name");
            }
            Err(err) => return Err(err.into()),
        }

        let legacy = self.definition_path(&legacy_diagram_file_name(workflow_id));
        self.repository
            .get_content(&legacy)
            .await
            .map_err(|err| not_found_as(err, format!("Process image of workflow {}", workflow_id)))
    }

    /// Replace the diagram of a workflow
    pub async fn set_process_image(&self, workflow_id: &str, png: Vec<u8>) -> KickstartResult<()> {
        validate_workflow_id(workflow_id)?;
        if !is_png(&png) {
            return Err(KickstartError::Validation(
                "Process image must be a PNG".to_string(),
            ));
        }

        let _lock = self.lock_workflow(workflow_id).await;

        let path = self.definition_path(&diagram_file_name(workflow_id));
        match self.repository.delete_document(&path, true).await {
            Ok(()) => debug!(%path, "Replaced existing diagram"),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        self.upload(
            &self.config.workflow_definition_folder,
            NewDocument::new(diagram_file_name(workflow_id), "image/png", png),
        )
        .await?;
        info!(%workflow_id, "Process image updated");
        Ok(())
    }

    /// Check that both folders can be resolved
    pub async fn health_check(&self) -> KickstartResult<()> {
        self.repository
            .resolve_folder(&self.config.workflow_definition_folder)
            .await?;
        self.repository
            .resolve_folder(&self.config.data_dictionary_folder)
            .await?;
        Ok(())
    }
}

fn not_found_as(err: RepositoryError, what: String) -> KickstartError {
    if err.is_not_found() {
        KickstartError::NotFound(what)
    } else {
        KickstartError::Repository(err)
    }
}
