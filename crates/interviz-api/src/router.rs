use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let index = state.config.index_path();

    Router::new()
        // Landing page
        .route_service("/", handlers::index_service(&index))
        .route_service("/index", handlers::index_service(&index))

        // Analyses
        .route("/viewshed", get(handlers::handle_viewshed))
        .route("/sunmask", get(handlers::handle_sunmask))

        // Health
        .route("/health", get(handlers::health_check))

        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
