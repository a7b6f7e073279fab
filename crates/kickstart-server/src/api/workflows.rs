//! Workflow deployment API
//!
//! Handlers for deploying, inspecting and removing kickstart workflows.

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kickstart_deploy::diagram::is_png;
use kickstart_deploy::{
    DeployReport, KickstartError, KickstartService, MetadataKey, PrerenderedDiagram,
    METADATA_JSON_SOURCE,
};
use kickstart_model::{WorkflowDefinition, WorkflowInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::errors::{api_error_response, ApiError};

/// Request for deploying or redeploying a workflow
#[derive(Debug, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Parsed from `workflow_json_source` when omitted
    #[serde(default)]
    pub workflow: Option<WorkflowDefinition>,

    /// Must carry `workflow_json_source`
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Base64-encoded PNG of the process diagram
    pub diagram: String,
}

/// Response for deploying a workflow
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub report: DeployReport,

    /// The workflow as deployed, with its id, assignees and form keys
    pub workflow: WorkflowDefinition,
}

/// Response for listing workflows
#[derive(Debug, Serialize, Deserialize)]
pub struct ListWorkflowsResponse {
    pub workflows: Vec<WorkflowInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountsQuery {
    #[serde(default)]
    pub include_counts: bool,
}

impl DeployRequest {
    fn take_workflow(&mut self) -> Result<WorkflowDefinition, ApiError> {
        if let Some(workflow) = self.workflow.take() {
            return Ok(workflow);
        }
        let source = self.metadata.get(METADATA_JSON_SOURCE).ok_or_else(|| {
            ApiError::Kickstart(KickstartError::MissingMetadata(METADATA_JSON_SOURCE.to_string()))
        })?;
        WorkflowDefinition::from_json(source).map_err(|e| {
            ApiError::BadRequest(format!("{} is not a workflow definition: {}", METADATA_JSON_SOURCE, e))
        })
    }
}

fn decode_diagram(encoded: &str) -> Result<PrerenderedDiagram, ApiError> {
    let png = base64::decode(encoded.trim())
        .map_err(|e| ApiError::BadRequest(format!("Diagram is not valid base64: {}", e)))?;
    if !is_png(&png) {
        return Err(ApiError::BadRequest("Diagram must be a PNG image".to_string()));
    }
    Ok(PrerenderedDiagram::new(png))
}

/// Handler for deploying a workflow
pub async fn deploy_workflow_handler(
    State(service): State<Arc<KickstartService>>,
    Json(mut request): Json<DeployRequest>,
) -> impl IntoResponse {
    let mut workflow = match request.take_workflow() {
        Ok(workflow) => workflow,
        Err(err) => return err.into_response(),
    };
    info!(name = %workflow.name, "Deploying workflow");

    let diagram = match decode_diagram(&request.diagram) {
        Ok(diagram) => diagram,
        Err(err) => return err.into_response(),
    };

    match service.deploy(&mut workflow, &request.metadata, &diagram).await {
        Ok(report) => (
            StatusCode::CREATED,
            Json(DeploymentResponse { report, workflow }),
        )
            .into_response(),
        Err(err) => {
            error!(?err, name = %workflow.name, "Failed to deploy workflow");
            api_error_response(&err)
        }
    }
}

/// Handler for replacing a deployed workflow
pub async fn redeploy_workflow_handler(
    State(service): State<Arc<KickstartService>>,
    Path(workflow_id): Path<String>,
    Json(mut request): Json<DeployRequest>,
) -> impl IntoResponse {
    info!(%workflow_id, "Redeploying workflow");

    let diagram = match decode_diagram(&request.diagram) {
        Ok(diagram) => diagram,
        Err(err) => return err.into_response(),
    };

    let mut workflow = match request.take_workflow() {
        Ok(workflow) => workflow,
        Err(err) => return err.into_response(),
    };
    let target = kickstart_deploy::naming::base_name(&workflow.name);
    if target != workflow_id {
        return ApiError::BadRequest(format!(
            "Workflow '{}' deploys as '{}', not '{}'",
            workflow.name, target, workflow_id
        ))
        .into_response();
    }

    match service.redeploy(&mut workflow, &request.metadata, &diagram).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            error!(?err, %workflow_id, "Failed to redeploy workflow");
            api_error_response(&err)
        }
    }
}

/// Handler for listing deployed workflows
pub async fn list_workflows_handler(
    State(service): State<Arc<KickstartService>>,
    Query(query): Query<CountsQuery>,
) -> impl IntoResponse {
    info!("Listing workflows");

    match service.list(query.include_counts).await {
        Ok(workflows) => (StatusCode::OK, Json(ListWorkflowsResponse { workflows })).into_response(),
        Err(err) => api_error_response(&err),
    }
}

/// Handler for getting one deployed workflow
pub async fn get_workflow_handler(
    State(service): State<Arc<KickstartService>>,
    Path(workflow_id): Path<String>,
    Query(query): Query<CountsQuery>,
) -> impl IntoResponse {
    info!(%workflow_id, include_counts = query.include_counts, "Getting workflow");

    match service.get(&workflow_id, query.include_counts).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(err) => api_error_response(&err),
    }
}

/// Handler for deleting a workflow
///
/// Answers 200 with the delete report even when some removals failed; the
/// report says which.
pub async fn delete_workflow_handler(
    State(service): State<Arc<KickstartService>>,
    Path(workflow_id): Path<String>,
) -> impl IntoResponse {
    info!(%workflow_id, "Deleting workflow");

    match service.delete(&workflow_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            error!(?err, %workflow_id, "Failed to delete workflow");
            api_error_response(&err)
        }
    }
}

/// Handler for reading a stored document of a workflow
pub async fn get_metadata_handler(
    State(service): State<Arc<KickstartService>>,
    Path((workflow_id, key)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = match key.parse::<MetadataKey>() {
        Ok(key) => key,
        Err(err) => return api_error_response(&err),
    };

    match service.workflow_metadata(&workflow_id, key).await {
        Ok(content) => {
            let content_type = match key {
                MetadataKey::JsonSource => "application/json",
                MetadataKey::FormConfig | MetadataKey::ProcessDefinition => "application/xml",
            };
            typed_response(content_type, Body::from(content))
        }
        Err(err) => api_error_response(&err),
    }
}

/// Handler for fetching the process diagram
pub async fn get_image_handler(
    State(service): State<Arc<KickstartService>>,
    Path(workflow_id): Path<String>,
) -> impl IntoResponse {
    match service.process_image(&workflow_id).await {
        Ok(png) => typed_response("image/png", Body::from(png)),
        Err(err) => api_error_response(&err),
    }
}

/// Handler for replacing the process diagram; the body is the raw PNG
pub async fn put_image_handler(
    State(service): State<Arc<KickstartService>>,
    Path(workflow_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    info!(%workflow_id, size = body.len(), "Replacing process image");

    match service.set_process_image(&workflow_id, body.to_vec()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => api_error_response(&err),
    }
}

fn typed_response(content_type: &'static str, body: Body) -> Response {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
