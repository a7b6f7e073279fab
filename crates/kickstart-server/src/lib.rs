//! Kickstart Server - HTTP surface of the kickstart workflow deployer
//!
//! Wires the repository gateway, the engine HTTP client and the deployment
//! service together and serves them over axum.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use kickstart_deploy::{Bpmn20Marshaller, DeployConfig, KickstartService, TemplateRegistry};
use kickstart_repository::cmis::CmisBrowserRepository;
use kickstart_repository::http::ReqwestHttpApi;
use kickstart_repository::memory::InMemoryRepository;
use kickstart_repository::DocumentRepository;

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

// Re-export key types
pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let service = Arc::new(create_service(&config.deploy).await?);
    service.health_check().await?;

    let app = api::build_router(service);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = match config.log_format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Plain => builder.try_init(),
    };
    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Create the content repository client
pub async fn create_repository(config: &DeployConfig) -> ServerResult<Arc<dyn DocumentRepository>> {
    if config.uses_memory_repository() {
        // Use in-memory repository for development and testing
        info!("Using in-memory repository");
        let repository = InMemoryRepository::with_folders(&[
            config.workflow_definition_folder.as_str(),
            config.data_dictionary_folder.as_str(),
        ])
        .await;
        return Ok(Arc::new(repository));
    }

    info!(url = %config.repository_url, "Using CMIS browser-binding repository");
    let repository = CmisBrowserRepository::connect(
        &config.repository_url,
        config.repository_auth(),
        config.http_timeout(),
    )
    .await?;
    Ok(Arc::new(repository))
}

/// Create the deployment service with its default collaborators
pub async fn create_service(config: &DeployConfig) -> ServerResult<KickstartService> {
    let repository = create_repository(config).await?;
    let http = Arc::new(ReqwestHttpApi::new(config.http_timeout())?);
    let templates = TemplateRegistry::load(config.template_dir.as_deref())
        .map_err(|e| ServerError::ConfigError(format!("Templates: {}", e)))?;

    Ok(KickstartService::new(
        repository,
        http,
        Arc::new(Bpmn20Marshaller::new()),
        Arc::new(templates),
        config.clone(),
    ))
}
