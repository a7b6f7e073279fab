//! Shared fixtures for deployment tests

#![allow(dead_code)]

use async_trait::async_trait;
use kickstart_deploy::{
    diagram::PNG_SIGNATURE, Bpmn20Marshaller, DeployConfig, KickstartService, TemplateRegistry,
    METADATA_JSON_SOURCE,
};
use kickstart_model::{FormProperty, ScriptTask, Task, UserTask, WorkflowDefinition};
use kickstart_repository::memory::{InMemoryRepository, RecordedOperation};
use kickstart_repository::{BasicAuth, HttpApi, HttpResponse, RepositoryError, RepositoryResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFINITIONS: &str = "/Data Dictionary/Workflow Definitions";
pub const MODELS: &str = "/Data Dictionary/Models";

pub const ENGINE_URL: &str = "http://engine.test/alfresco/service/";
pub const SHARE_URL: &str = "http://share.test/share/";

/// An HTTP call received by the scripted engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCall {
    Get(String),
    Post { url: String, body: String },
    Delete(String),
}

#[derive(Debug)]
struct EngineState {
    instances: Vec<String>,
    calls: Vec<HttpCall>,
    module_upload_status: u16,
    module_delete_status: u16,
    /// Number of upcoming instance deletes to reject
    failing_deletes: usize,
    instance_query_status: u16,
    /// Instances survive deletion, as if new ones keep starting
    stuck: bool,
    /// Every HTTP call fails at the transport level
    offline: bool,
    /// Repository deletes already performed when each instance delete arrived
    repository_deletes_seen: Vec<usize>,
}

/// Workflow engine and Share module endpoints, scripted in memory
#[derive(Debug)]
pub struct ScriptedEngine {
    state: Mutex<EngineState>,
    watched: Option<InMemoryRepository>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                instances: Vec::new(),
                calls: Vec::new(),
                module_upload_status: 200,
                module_delete_status: 200,
                failing_deletes: 0,
                instance_query_status: 200,
                stuck: false,
                offline: false,
                repository_deletes_seen: Vec::new(),
            }),
            watched: None,
        }
    }

    pub fn with_instances(self, count: usize) -> Self {
        self.state.lock().unwrap().instances = (1..=count).map(|i| format!("instance-{}", i)).collect();
        self
    }

    pub fn watching(mut self, repository: InMemoryRepository) -> Self {
        self.watched = Some(repository);
        self
    }

    pub fn stuck(self) -> Self {
        self.state.lock().unwrap().stuck = true;
        self
    }

    pub fn offline(self) -> Self {
        self.state.lock().unwrap().offline = true;
        self
    }

    pub fn module_upload_status(self, status: u16) -> Self {
        self.state.lock().unwrap().module_upload_status = status;
        self
    }

    pub fn module_delete_status(self, status: u16) -> Self {
        self.state.lock().unwrap().module_delete_status = status;
        self
    }

    pub fn failing_deletes(self, count: usize) -> Self {
        self.state.lock().unwrap().failing_deletes = count;
        self
    }

    pub fn instance_query_status(self, status: u16) -> Self {
        self.state.lock().unwrap().instance_query_status = status;
        self
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn instance_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HttpCall::Get(url) if url.contains("/api/workflow-instances?") => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn instance_deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HttpCall::Delete(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn posted_bodies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HttpCall::Post { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn remaining_instances(&self) -> usize {
        self.state.lock().unwrap().instances.len()
    }

    pub fn repository_deletes_seen(&self) -> Vec<usize> {
        self.state.lock().unwrap().repository_deletes_seen.clone()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    fn offline_error() -> RepositoryError {
        RepositoryError::BackendError(anyhow::anyhow!("connection refused"))
    }
}

#[async_trait]
impl HttpApi for ScriptedEngine {
    async fn get(&self, url: &str, _auth: &BasicAuth) -> RepositoryResult<HttpResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HttpCall::Get(url.to_string()));
        if state.offline {
            return Err(Self::offline_error());
        }

        if url.contains("/api/workflow-instances?") {
            if state.instance_query_status != 200 {
                return Ok(HttpResponse::new(state.instance_query_status, "engine failure"));
            }
            let max_items: usize = Self::query_param(url, "maxItems")
                .and_then(|value| value.parse().ok())
                .unwrap_or(usize::MAX);
            let data: Vec<_> = state
                .instances
                .iter()
                .take(max_items)
                .map(|id| json!({ "id": id }))
                .collect();
            let body = json!({
                "data": data,
                "paging": { "totalItems": state.instances.len(), "maxItems": max_items, "skipCount": 0 }
            });
            return Ok(HttpResponse::new(200, body.to_string()));
        }

        if url.contains("page/modules/module/delete") {
            return Ok(HttpResponse::new(state.module_delete_status, "<html/>"));
        }

        Ok(HttpResponse::new(404, "not found"))
    }

    async fn post(
        &self,
        url: &str,
        body: String,
        _content_type: &str,
        _auth: &BasicAuth,
    ) -> RepositoryResult<HttpResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HttpCall::Post {
            url: url.to_string(),
            body,
        });
        if state.offline {
            return Err(Self::offline_error());
        }
        Ok(HttpResponse::new(state.module_upload_status, ""))
    }

    async fn delete(&self, url: &str, _auth: &BasicAuth) -> RepositoryResult<HttpResponse> {
        let deletes_so_far = match &self.watched {
            Some(repository) => repository
                .operations()
                .await
                .iter()
                .filter(|op| matches!(op, RecordedOperation::Delete(_)))
                .count(),
            None => 0,
        };

        let mut state = self.state.lock().unwrap();
        state.calls.push(HttpCall::Delete(url.to_string()));
        state.repository_deletes_seen.push(deletes_so_far);
        if state.offline {
            return Err(Self::offline_error());
        }
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Ok(HttpResponse::new(500, "cannot delete"));
        }

        let instance = url
            .split("/api/workflow-instances/")
            .nth(1)
            .and_then(|rest| rest.split('?').next())
            .unwrap_or_default()
            .to_string();
        if !state.stuck {
            state.instances.retain(|id| *id != instance);
        }
        Ok(HttpResponse::new(200, ""))
    }
}

pub fn config() -> DeployConfig {
    DeployConfig {
        engine_url: ENGINE_URL.to_string(),
        share_url: SHARE_URL.to_string(),
        ..DeployConfig::default()
    }
}

pub async fn repository() -> InMemoryRepository {
    InMemoryRepository::with_folders(&[DEFINITIONS, MODELS])
        .await
        .with_recording()
}

/// Initialize tracing for tests; RUST_LOG selects the output
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn service(repository: &InMemoryRepository, engine: &Arc<ScriptedEngine>, config: DeployConfig) -> KickstartService {
    init_test_tracing();
    KickstartService::new(
        Arc::new(repository.clone()),
        engine.clone(),
        Arc::new(Bpmn20Marshaller::new()),
        Arc::new(TemplateRegistry::builtin().unwrap()),
        config,
    )
}

pub fn png() -> Vec<u8> {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(b"\0\0\0\rIHDR");
    png
}

pub fn expense_workflow() -> WorkflowDefinition {
    let mut approve = UserTask::new("Approve Expense").with_form(vec![
        FormProperty::new("Customer Name", "text", true),
        FormProperty::new("Due Date", "date", false),
        FormProperty::new("Amount", "number", true),
    ]);
    approve.assignee = Some("kermit".to_string());

    WorkflowDefinition::new("Expense Approval")
        .with_task(Task::User(approve))
        .with_task(Task::Script(ScriptTask {
            name: "Archive".to_string(),
            description: None,
            script_format: "javascript".to_string(),
            script: "logger.log('archived');".to_string(),
        }))
}

pub fn metadata(workflow: &WorkflowDefinition) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(
        METADATA_JSON_SOURCE.to_string(),
        serde_json::to_string(workflow).unwrap(),
    );
    metadata
}

pub fn definition(name: &str) -> String {
    format!("{}/{}", DEFINITIONS, name)
}

pub fn model(name: &str) -> String {
    format!("{}/{}", MODELS, name)
}
