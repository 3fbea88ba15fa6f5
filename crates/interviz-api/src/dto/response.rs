use interviz_engine::DispatcherStats;
use serde::Serialize;

/// Body of every error response: `{"message": "Error : <detail>"}`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn error(detail: impl std::fmt::Display) -> Self {
        Self { message: format!("Error : {}", detail) }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub location: String,
    pub policy: String,
    pub crs: String,
    pub jobs: DispatcherStats,
}
