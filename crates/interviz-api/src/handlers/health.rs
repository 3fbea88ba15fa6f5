use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "interviz-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        location: state.location.clone(),
        policy: state.region_policy.to_string(),
        crs: state.extent.crs_identifier(),
        jobs: state.dispatcher.stats(),
    })
}
