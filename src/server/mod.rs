//! ML Workbench Server Module
//!
//! REST API over the record store and the background job queue. Requests
//! create records and dispatch jobs; clients poll the status endpoints.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::jobs::{MediaPaths, QueueConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub media_root: PathBuf,
    pub records_path: PathBuf,
    pub max_upload_size: usize,
    pub max_concurrent_jobs: usize,
    /// Applies to evaluation and prediction jobs; 0 means unbounded.
    pub job_timeout_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for ServerConfig {
    fn default() -> Self {
        let media_root = PathBuf::from(std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()));
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("API_PORT").unwrap_or(8080),
            records_path: std::env::var("RECORDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| media_root.join("records.json")),
            media_root,
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(100 * 1024 * 1024), // 100MB
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(2),
            job_timeout_secs: env_parse("JOB_TIMEOUT_SECS").unwrap_or(0),
        }
    }
}

impl ServerConfig {
    /// Point the media root (and the default snapshot location) somewhere else.
    pub fn with_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if self.records_path == self.media_root.join("records.json") {
            self.records_path = root.join("records.json");
        }
        self.media_root = root;
        self
    }

    pub fn media(&self) -> MediaPaths {
        MediaPaths::new(&self.media_root)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_concurrent: self.max_concurrent_jobs,
            job_timeout: (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs)),
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        media_root = %config.media_root.display(),
        records = %config.records_path.display(),
        started_at = %start_time.to_rfc3339(),
        "Opening record store"
    );

    let state = Arc::new(AppState::new(config.clone())?);
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_timeout_secs = config.job_timeout_secs,
        "ML Workbench server starting"
    );
    info!(url = %format!("http://{}/api", addr), "REST API available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not install CTRL+C handler, running until killed");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert!(config.max_concurrent_jobs >= 1);
    }

    #[test]
    fn test_media_root_moves_default_snapshot() {
        let config = ServerConfig::default().with_media_root("/tmp/wb");
        assert_eq!(config.records_path, PathBuf::from("/tmp/wb/records.json"));
        assert_eq!(config.media().models, PathBuf::from("/tmp/wb/MLmodels"));
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let mut config = ServerConfig::default();
        config.job_timeout_secs = 0;
        assert!(config.queue_config().job_timeout.is_none());
        config.job_timeout_secs = 30;
        assert_eq!(config.queue_config().job_timeout, Some(Duration::from_secs(30)));
    }
}
