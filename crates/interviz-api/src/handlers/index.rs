use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use interviz_core::config::ErrorStatusMode;
use tower_http::services::ServeFile;

use crate::state::AppState;

/// Static landing page
pub fn index_service(path: &Path) -> ServeFile {
    ServeFile::new(path)
}

/// Fallback for every unknown route.
///
/// Compat mode answers 200 like every other error.
pub async fn not_found(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = match state.config.error_status {
        ErrorStatusMode::Compat => StatusCode::OK,
        ErrorStatusMode::Http => StatusCode::NOT_FOUND,
    };
    (status, "ERROR 404 !")
}
