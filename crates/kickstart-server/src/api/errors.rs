//! Error handling for the Kickstart Server API
//!
//! Every failed request answers with the same JSON shape:
//! `{"error": …, "errorDetails": {"errorCode": …, "errorMessage": …}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kickstart_deploy::KickstartError;
use kickstart_repository::RepositoryError;
use serde_json::json;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Not found (404)
    NotFound(String),
    /// Wrapped deployment error
    Kickstart(KickstartError),
}

impl From<KickstartError> for ApiError {
    fn from(err: KickstartError) -> Self {
        ApiError::Kickstart(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Kickstart(err) => write!(f, "{}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", msg),
            ApiError::Kickstart(err) => return api_error_response(&err),
        };
        error_body(status, error_code, &message)
    }
}

/// Status and error code for a deployment error
pub fn classify(err: &KickstartError) -> (StatusCode, &'static str) {
    match err {
        KickstartError::MissingMetadata(_) => (StatusCode::BAD_REQUEST, "ERR_MISSING_METADATA"),
        KickstartError::Validation(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
        KickstartError::AlreadyDeployed(_) => (StatusCode::CONFLICT, "ERR_ALREADY_DEPLOYED"),
        KickstartError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
        KickstartError::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, "ERR_UNSUPPORTED"),
        KickstartError::DrainIncomplete { .. } => (StatusCode::CONFLICT, "ERR_DRAIN_INCOMPLETE"),
        KickstartError::Template(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_TEMPLATE_ERROR"),
        KickstartError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_RENDER_ERROR"),
        KickstartError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_CONFIGURATION_ERROR"),
        KickstartError::Repository(RepositoryError::RemoteStatus { .. }) => {
            (StatusCode::BAD_GATEWAY, "ERR_REMOTE_STATUS")
        }
        KickstartError::Repository(_) => (StatusCode::BAD_GATEWAY, "ERR_REPOSITORY_ERROR"),
    }
}

/// Convert a deployment error into a standardized API error response
pub fn api_error_response(err: &KickstartError) -> Response {
    let (status, error_code) = classify(err);
    if status.is_server_error() {
        tracing::error!(?err, "Request failed");
    }
    error_body(status, error_code, &err.to_string())
}

fn error_body(status: StatusCode, error_code: &str, message: &str) -> Response {
    let body = Json(json!({
        "error": message,
        "errorDetails": {
            "errorCode": error_code,
            "errorMessage": message,
        }
    }));
    (status, body).into_response()
}
