//! Process configuration, read from the environment.

use crate::api::ApiServerConfig;
use crate::database::DatabaseConfig;
use crate::media::MediaConfig;
use crate::pipeline::{HttpClientConfig, LifecycleConfig, OrchestratorConfig, WorkerPoolConfig};

/// Settings of every component, gathered at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiServerConfig,
    pub worker_pool: WorkerPoolConfig,
    pub orchestrator: OrchestratorConfig,
    pub lifecycle: LifecycleConfig,
    pub media: MediaConfig,
    pub http: HttpClientConfig,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            api: ApiServerConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            lifecycle: LifecycleConfig::default(),
            media: MediaConfig::default(),
            http: HttpClientConfig::default(),
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Read every component's variables. Load `.env` before calling this.
    pub fn from_env_or_default() -> Self {
        Self {
            database: DatabaseConfig::from_env_or_default(),
            api: ApiServerConfig::from_env_or_default(),
            worker_pool: WorkerPoolConfig::from_env_or_default(),
            orchestrator: OrchestratorConfig::from_env_or_default(),
            lifecycle: LifecycleConfig::from_env_or_default(),
            media: MediaConfig::from_env_or_default(),
            http: HttpClientConfig::from_env_or_default(),
            log_dir: std::env::var("LOG_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .unwrap_or_else(|| "logs".to_string()),
        }
    }
}
