//! API module for the Kickstart Server
//!
//! This module contains the API routes and handlers for the Kickstart Server.

use axum::{
    routing::{get, post},
    Router,
};
use kickstart_deploy::KickstartService;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod health;
pub mod workflows;

/// Build the router for API endpoints
pub fn build_router(service: Arc<KickstartService>) -> Router {
    Router::new()
        // Workflow lifecycle
        .route(
            "/v1/workflows",
            post(workflows::deploy_workflow_handler).get(workflows::list_workflows_handler),
        )
        .route(
            "/v1/workflows/:workflow_id",
            get(workflows::get_workflow_handler)
                .put(workflows::redeploy_workflow_handler)
                .delete(workflows::delete_workflow_handler),
        )
        .route(
            "/v1/workflows/:workflow_id/image",
            get(workflows::get_image_handler).put(workflows::put_image_handler),
        )
        .route(
            "/v1/workflows/:workflow_id/metadata/:key",
            get(workflows::get_metadata_handler),
        )
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// Re-export all modules for easier imports
pub use errors::*;
pub use health::*;
pub use workflows::*;
