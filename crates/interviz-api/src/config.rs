use interviz_core::config::{ErrorStatusMode, LayeredConfig};
use std::path::PathBuf;

/// HTTP server settings, taken from the layered configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub static_dir: PathBuf,
    pub error_status: ErrorStatusMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_layered(&LayeredConfig::with_defaults())
    }
}

impl ApiConfig {
    pub fn from_layered(config: &LayeredConfig) -> Self {
        Self {
            host: config.host.value.clone(),
            port: config.port.value,
            cors_origin: config.cors_origin.value.clone(),
            static_dir: config.static_dir.value.clone(),
            error_status: config.error_status.value,
        }
    }

    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Landing page served on `/` and `/index`
    pub fn index_path(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}
