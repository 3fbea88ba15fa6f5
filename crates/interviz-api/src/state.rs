use interviz_core::config::RegionPolicy;
use interviz_core::error::InterVizError;
use interviz_core::models::RasterExtent;
use interviz_engine::Dispatcher;
use interviz_geo::transform::ToNative;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Shared state handed to every handler.
///
/// Everything here is built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    pub extent: RasterExtent,
    pub projector: Arc<dyn ToNative + Send + Sync>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: ApiConfig,
    pub location: String,
    pub region_policy: RegionPolicy,
}

impl AppState {
    pub fn new(
        extent: RasterExtent,
        projector: Arc<dyn ToNative + Send + Sync>,
        dispatcher: Arc<Dispatcher>,
        config: ApiConfig,
        location: impl Into<String>,
        region_policy: RegionPolicy,
    ) -> Self {
        Self {
            extent,
            projector,
            dispatcher,
            config,
            location: location.into(),
            region_policy,
        }
    }

    /// Render a domain error under the configured status mode
    pub fn reject(&self, err: InterVizError) -> ApiError {
        ApiError::from_domain(err, self.config.error_status)
    }
}
