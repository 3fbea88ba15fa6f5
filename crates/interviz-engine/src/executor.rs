//! Execution of a single job inside an engine session.

use geojson::FeatureCollection;
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{Job, JobKind, JobParams, Region};
use interviz_geo::features::to_feature_collection;
use interviz_geo::polygonize::polygonize;
use interviz_geo::raster::RasterGrid;
use interviz_geo::transform::ToGeographic;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ports::{Engine, EngineSpace, SunmaskRequest, ViewshedRequest};
use crate::workspace::{Workspace, REFERENCE_LAYER};

/// Cell value extracted from binary result rasters
const TARGET_VALUE: f64 = 1.0;

/// Runs jobs against the engine and turns their rasters into features.
///
/// A run never leaves anything behind: the job's layer and exported file
/// are removed and a narrowed region is restored whatever the outcome.
pub struct JobExecutor {
    engine: Arc<dyn Engine>,
    workspace: Arc<Workspace>,
    transform: Arc<dyn ToGeographic + Send + Sync>,
}

impl JobExecutor {
    pub fn new(
        engine: Arc<dyn Engine>,
        workspace: Arc<Workspace>,
        transform: Arc<dyn ToGeographic + Send + Sync>,
    ) -> Self {
        Self {
            engine,
            workspace,
            transform,
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub async fn run(&self, job: &Job, space: &EngineSpace) -> Result<FeatureCollection> {
        let export_path = self.workspace.export_path(&job.id);

        let computed = self.compute(job, space, &export_path).await;
        let result = match computed {
            Ok(()) => self.vectorize(job.kind(), export_path).await,
            Err(e) => Err(e),
        };

        self.discard_artifacts(job, space).await;
        result
    }

    /// Undo whatever an interrupted run may have left behind
    pub async fn recover(&self, job: &Job, space: &EngineSpace) {
        if job.kind().narrows_region() {
            if let Err(e) = self.engine.set_region(space, &self.workspace.full_region()).await {
                tracing::error!("Job {}: could not restore the full region: {}", job.id, e);
            }
        }
        self.discard_artifacts(job, space).await;
    }

    async fn compute(&self, job: &Job, space: &EngineSpace, export_path: &Path) -> Result<()> {
        let layer = job.id.layer_name();

        match &job.params {
            JobParams::Viewshed {
                observer_height,
                target_height,
                max_distance,
            } => {
                let request = ViewshedRequest {
                    elevation: REFERENCE_LAYER.to_string(),
                    coord: job.coord,
                    observer_height: *observer_height,
                    target_height: *target_height,
                    max_distance: *max_distance,
                    output: layer.clone(),
                };
                self.engine.viewshed(space, &request).await?;
                self.engine.export_raster(space, &layer, export_path).await
            }
            JobParams::Sunmask {
                datetime,
                timezone,
                max_distance,
            } => {
                let request = SunmaskRequest {
                    elevation: REFERENCE_LAYER.to_string(),
                    datetime: *datetime,
                    timezone: *timezone,
                    output: layer.clone(),
                };
                let full = self.workspace.full_region();
                let window = Region::window(job.coord, *max_distance, full.ewres, full.nsres);

                with_narrowed_region(self.engine.as_ref(), space, &window, &full, async {
                    self.engine.sunmask(space, &request).await?;
                    self.engine.export_raster(space, &layer, export_path).await
                })
                .await
            }
        }
    }

    async fn vectorize(&self, kind: JobKind, export_path: PathBuf) -> Result<FeatureCollection> {
        let transform = Arc::clone(&self.transform);

        tokio::task::spawn_blocking(move || {
            let content = std::fs::read_to_string(&export_path)?;
            let grid = RasterGrid::parse_grass_ascii(&content)?;
            let shapes = polygonize(&grid, TARGET_VALUE);
            to_feature_collection(&shapes, kind.property_name(), transform.as_ref())
        })
        .await
        .map_err(|e| InterVizError::computation("vectorization", e.to_string()))?
    }

    async fn discard_artifacts(&self, job: &Job, space: &EngineSpace) {
        let layer = job.id.layer_name();
        if let Err(e) = self.engine.remove_raster(space, &layer).await {
            tracing::warn!("Job {}: could not remove layer {}: {}", job.id, layer, e);
        }

        let export_path = self.workspace.export_path(&job.id);
        match tokio::fs::remove_file(&export_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Job {}: could not remove {}: {}",
                job.id,
                export_path.display(),
                e
            ),
        }
    }
}

/// Run `body` with the region narrowed to `window`, then restore `full`.
///
/// Restoration is attempted even when narrowing or `body` fails. The first
/// error wins; a failed restoration is reported when everything else
/// succeeded.
pub async fn with_narrowed_region<F, T>(
    engine: &dyn Engine,
    space: &EngineSpace,
    window: &Region,
    full: &Region,
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let outcome = match engine.set_region(space, window).await {
        Ok(()) => body.await,
        Err(e) => Err(e),
    };

    let restored = engine.set_region(space, full).await;
    match (outcome, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore)) => {
            tracing::error!("Region restoration failed after an error: {}", restore);
            Err(e)
        }
    }
}
