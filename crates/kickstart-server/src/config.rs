//! Configuration for the Kickstart Server
//!
//! Values come from environment variables; anything unset keeps its default.

use kickstart_deploy::DeployConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(ServerError::ConfigError(format!("Unknown log format '{}'", other))),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log level, used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Deployment service settings
    #[serde(default)]
    pub deploy: DeployConfig,
}

fn default_port() -> u16 {
    8090
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Plain
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from a variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let mut config = Self::default();

        parse_into(&lookup, "SERVER_PORT", &mut config.port);
        if let Some(host) = lookup("SERVER_HOST") {
            config.bind_address = host;
        }
        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level;
        }
        parse_into(&lookup, "LOG_FORMAT", &mut config.log_format);

        let deploy = &mut config.deploy;
        for (name, field) in [
            ("KICKSTART_REPOSITORY_URL", &mut deploy.repository_url),
            ("KICKSTART_REPOSITORY_USER", &mut deploy.repository_user),
            ("KICKSTART_REPOSITORY_PASSWORD", &mut deploy.repository_password),
            ("KICKSTART_ENGINE_URL", &mut deploy.engine_url),
            ("KICKSTART_SHARE_URL", &mut deploy.share_url),
            ("KICKSTART_MODULE_USER", &mut deploy.module_user),
            ("KICKSTART_MODULE_PASSWORD", &mut deploy.module_password),
            ("KICKSTART_WORKFLOW_DEFINITION_FOLDER", &mut deploy.workflow_definition_folder),
            ("KICKSTART_DATA_DICTIONARY_FOLDER", &mut deploy.data_dictionary_folder),
            ("KICKSTART_DEFAULT_ASSIGNEE", &mut deploy.default_assignee),
        ] {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }
        parse_into(&lookup, "KICKSTART_DRAIN_PAGE_SIZE", &mut deploy.drain_page_size);
        parse_into(&lookup, "KICKSTART_MAX_DRAIN_ROUNDS", &mut deploy.max_drain_rounds);
        parse_into(&lookup, "KICKSTART_HTTP_TIMEOUT_SECS", &mut deploy.http_timeout_secs);
        if let Some(dir) = lookup("KICKSTART_TEMPLATE_DIR") {
            deploy.template_dir = Some(PathBuf::from(dir));
        }

        config
            .deploy
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        if config.deploy.uses_memory_repository() {
            warn!("Using the in-memory repository; deployments will not survive a restart");
        }

        info!("Loaded server configuration");
        Ok(config)
    }
}

/// Overwrite `target` with a parsed variable, keeping it when the value is invalid
fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) {
    if let Some(raw) = lookup(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            deploy: DeployConfig::default(),
        }
    }
}
