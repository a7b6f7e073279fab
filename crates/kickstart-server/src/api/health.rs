//! Health check endpoint for the Kickstart Server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use kickstart_deploy::KickstartService;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Health check handler
///
/// Reports the repository as DOWN when either deployment folder cannot be
/// resolved.
pub async fn health_check(State(service): State<Arc<KickstartService>>) -> impl IntoResponse {
    info!("Health check requested");

    let mut response = json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": {},
    });

    let repository_status = match service.health_check().await {
        Ok(()) => "UP",
        Err(err) => {
            warn!(?err, "Repository health check failed");
            "DOWN"
        }
    };
    response["dependencies"]["repository"] = json!({
        "status": repository_status,
    });

    if repository_status == "DOWN" {
        response["status"] = json!("DOWN");
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    } else {
        (StatusCode::OK, Json(response))
    }
}
