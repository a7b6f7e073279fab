//! HTTP collaborator for the workflow engine and form module endpoints
//!
//! Every call carries its own basic-auth credentials, since the engine and the
//! module endpoints may be protected by different accounts.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use crate::{RepositoryError, RepositoryResult};

/// Basic-auth credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// Create new credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs
impl Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Status code and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an error
    pub fn error_for_status(self) -> RepositoryResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RepositoryError::RemoteStatus {
                status: self.status,
                message: self.body,
            })
        }
    }
}

/// Contract of the HTTP collaborator
///
/// Transport failures are errors; any HTTP status, including 4xx/5xx, is a
/// successful call returning an [`HttpResponse`].
#[async_trait]
pub trait HttpApi: Send + Sync + Debug {
    /// Issue a GET request
    async fn get(&self, url: &str, auth: &BasicAuth) -> RepositoryResult<HttpResponse>;

    /// Issue a POST request with a text body
    async fn post(
        &self,
        url: &str,
        body: String,
        content_type: &str,
        auth: &BasicAuth,
    ) -> RepositoryResult<HttpResponse>;

    /// Issue a DELETE request
    async fn delete(&self, url: &str, auth: &BasicAuth) -> RepositoryResult<HttpResponse>;
}

/// reqwest implementation of [`HttpApi`]
#[derive(Debug, Clone)]
pub struct ReqwestHttpApi {
    client: Client,
}

impl ReqwestHttpApi {
    /// Create a new client with the given transport timeout
    pub fn new(timeout: Duration) -> RepositoryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RepositoryError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn execute(&self, request: RequestBuilder, auth: &BasicAuth) -> RepositoryResult<HttpResponse> {
        let response = request
            .basic_auth(&auth.username, Some(&auth.password))
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        debug!(status, body_len = body.len(), "HTTP response received");
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpApi for ReqwestHttpApi {
    async fn get(&self, url: &str, auth: &BasicAuth) -> RepositoryResult<HttpResponse> {
        debug!(%url, "Executing GET");
        self.execute(self.client.get(url), auth).await
    }

    async fn post(
        &self,
        url: &str,
        body: String,
        content_type: &str,
        auth: &BasicAuth,
    ) -> RepositoryResult<HttpResponse> {
        debug!(%url, %content_type, "Executing POST");
        let request = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .body(body);
        self.execute(request, auth).await
    }

    async fn delete(&self, url: &str, auth: &BasicAuth) -> RepositoryResult<HttpResponse> {
        debug!(%url, "Executing DELETE");
        self.execute(self.client.delete(url), auth).await
    }
}
