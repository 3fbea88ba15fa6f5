use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use geojson::FeatureCollection;

use crate::dto::{QueryPairs, ViewshedQuery};
use crate::error::ApiError;
use crate::services::AnalysisService;
use crate::state::AppState;

pub async fn handle_viewshed(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<FeatureCollection>, ApiError> {
    let query = ViewshedQuery::from_pairs(&pairs);
    let job = AnalysisService::viewshed_job(&state, &query).map_err(|e| {
        tracing::info!(error = %e, "Rejected viewshed request");
        state.reject(e)
    })?;

    tracing::info!(
        job_id = %job.id,
        coordinates = %job.coord,
        max_distance = job.params.max_distance(),
        "Processing viewshed request"
    );

    let result = AnalysisService::run(&state, job).await.map_err(|e| state.reject(e))?;

    Ok(Json(result))
}
