//! In-process engine for tests and local development.
//!
//! Regions live in the same `WIND` files the real engine uses, so mapset
//! cloning and region restoration behave identically. Layers are kept in
//! memory and computed from simple synthetic rules:
//!
//! - viewshed: cells whose center is within `max_distance` of the observer
//!   are visible (1), the rest are not (0)
//! - sunmask: cells in the northern half of the active region are 1, the
//!   rest 0
//!
//! Operations can be delayed or made to fail to exercise concurrency,
//! timeout and cleanup paths.

use async_trait::async_trait;
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{RasterExtent, Region};
use interviz_geo::raster::RasterGrid;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::{Engine, EngineSpace, SunmaskRequest, ViewshedRequest};
use crate::wind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateLocation,
    LinkRaster,
    SetRegion,
    Viewshed,
    Sunmask,
    Export,
    Remove,
}

impl Operation {
    /// Name of the engine tool the operation stands for
    pub fn tool(&self) -> &'static str {
        match self {
            Operation::CreateLocation => "grass -c",
            Operation::LinkRaster => "r.external",
            Operation::SetRegion => "g.region",
            Operation::Viewshed => "r.viewshed",
            Operation::Sunmask => "r.sunmask",
            Operation::Export => "r.out.ascii",
            Operation::Remove => "g.remove",
        }
    }
}

/// Region seen by a computation when it started and when it finished
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub operation: Operation,
    pub mapset: String,
    pub region_at_start: Region,
    pub region_at_end: Region,
}

#[derive(Debug, Default)]
pub struct MemoryEngine {
    /// Computed layers, keyed by mapset directory and layer name
    layers: Mutex<HashMap<(PathBuf, String), RasterGrid>>,
    /// Linked rasters, keyed by location directory and layer name
    references: Mutex<HashMap<(PathBuf, String), PathBuf>>,
    observations: Mutex<Vec<Observation>>,
    failures: Mutex<HashSet<Operation>>,
    delays: Mutex<HashMap<Operation, Duration>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `operation` fail
    pub fn fail_on(&self, operation: Operation) {
        lock(&self.failures).insert(operation);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Make every future call of `operation` take at least `delay`
    pub fn delay(&self, operation: Operation, delay: Duration) {
        lock(&self.delays).insert(operation, delay);
    }

    pub fn observations(&self) -> Vec<Observation> {
        lock(&self.observations).clone()
    }

    /// Names of the layers currently stored in `space`'s mapset
    pub fn layers_in(&self, space: &EngineSpace) -> Vec<String> {
        let mapset = space.mapset_path();
        let mut names: Vec<String> = lock(&self.layers)
            .keys()
            .filter(|(path, _)| *path == mapset)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn layer_count(&self) -> usize {
        lock(&self.layers).len()
    }

    /// Highest number of computations that ran at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: Operation) -> Result<()> {
        let delay = lock(&self.delays).get(&operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failures).contains(&operation) {
            return Err(InterVizError::computation(
                operation.tool(),
                "ERROR: injected failure",
            ));
        }
        Ok(())
    }

    fn check_reference(&self, space: &EngineSpace, layer: &str) -> Result<()> {
        let key = (space.location_path(), layer.to_string());
        if lock(&self.references).contains_key(&key) {
            Ok(())
        } else {
            Err(InterVizError::computation(
                "elevation",
                format!("ERROR: Raster map <{}> not found", layer),
            ))
        }
    }

    /// Run a computation: observe the region, wait, observe it again and
    /// store the layer produced from the region seen at the end.
    async fn compute<F>(
        &self,
        operation: Operation,
        space: &EngineSpace,
        output: &str,
        fill: F,
    ) -> Result<()>
    where
        F: Fn(&RasterGrid, usize, usize) -> f64 + Send,
    {
        let region_at_start = read_wind(space, operation)?;

        {
            let _running = Running::enter(&self.active, &self.peak);
            self.enter(operation).await?;
        }

        let region_at_end = read_wind(space, operation)?;
        lock(&self.observations).push(Observation {
            operation,
            mapset: space.mapset.clone(),
            region_at_start,
            region_at_end,
        });

        let mut grid = RasterGrid::empty(&region_at_end);
        for row in 0..grid.rows {
            for col in 0..grid.cols {
                let value = fill(&grid, row, col);
                grid.set(row, col, Some(value));
            }
        }

        lock(&self.layers).insert((space.mapset_path(), output.to_string()), grid);
        Ok(())
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn create_location(
        &self,
        gisdbase: &Path,
        location: &str,
        extent: &RasterExtent,
        _raster: &Path,
    ) -> Result<()> {
        self.enter(Operation::CreateLocation).await?;

        let permanent = gisdbase.join(location).join("PERMANENT");
        if permanent.exists() {
            return Err(InterVizError::bootstrap(format!(
                "location {} already exists",
                gisdbase.join(location).display()
            )));
        }
        fs::create_dir_all(&permanent)?;

        let region = Region::from_extent(extent);
        wind::write_region(&permanent.join("DEFAULT_WIND"), &region)?;
        wind::write_region(&permanent.join("WIND"), &region)?;
        Ok(())
    }

    async fn link_raster(&self, space: &EngineSpace, raster: &Path, layer: &str) -> Result<()> {
        self.enter(Operation::LinkRaster).await?;

        if !raster.is_file() {
            return Err(InterVizError::computation(
                Operation::LinkRaster.tool(),
                format!("ERROR: Unable to open {}", raster.display()),
            ));
        }
        lock(&self.references)
            .insert((space.location_path(), layer.to_string()), raster.to_path_buf());
        Ok(())
    }

    async fn set_region(&self, space: &EngineSpace, region: &Region) -> Result<()> {
        self.enter(Operation::SetRegion).await?;

        if !space.mapset_path().is_dir() {
            return Err(InterVizError::computation(
                Operation::SetRegion.tool(),
                format!("ERROR: mapset <{}> does not exist", space.mapset),
            ));
        }
        wind::write_region(&space.wind_path(), region)
    }

    async fn viewshed(&self, space: &EngineSpace, request: &ViewshedRequest) -> Result<()> {
        self.check_reference(space, &request.elevation)?;

        let observer = request.coord;
        let radius = request.max_distance;
        self.compute(Operation::Viewshed, space, &request.output, move |grid, row, col| {
            let (x, y) = grid.cell_center(row, col);
            if (x - observer.x).hypot(y - observer.y) <= radius {
                1.0
            } else {
                0.0
            }
        })
        .await
    }

    async fn sunmask(&self, space: &EngineSpace, request: &SunmaskRequest) -> Result<()> {
        self.check_reference(space, &request.elevation)?;

        self.compute(Operation::Sunmask, space, &request.output, |grid, row, _| {
            if row < grid.rows / 2 {
                1.0
            } else {
                0.0
            }
        })
        .await
    }

    async fn export_raster(&self, space: &EngineSpace, layer: &str, output: &Path) -> Result<()> {
        self.enter(Operation::Export).await?;

        let region = read_wind(space, Operation::Export)?;
        let exported = {
            let layers = lock(&self.layers);
            let grid = layers
                .get(&(space.mapset_path(), layer.to_string()))
                .ok_or_else(|| {
                    InterVizError::computation(
                        Operation::Export.tool(),
                        format!("ERROR: Raster map <{}> not found", layer),
                    )
                })?;
            resample(grid, &region)
        };

        tokio::fs::write(output, exported.to_grass_ascii()).await?;
        Ok(())
    }

    async fn remove_raster(&self, space: &EngineSpace, layer: &str) -> Result<()> {
        self.enter(Operation::Remove).await?;
        lock(&self.layers).remove(&(space.mapset_path(), layer.to_string()));
        Ok(())
    }
}

/// Counts a computation as running until dropped, even when cancelled
struct Running<'a>(&'a AtomicUsize);

impl<'a> Running<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let running = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(running, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_wind(space: &EngineSpace, operation: Operation) -> Result<Region> {
    wind::read_region(&space.wind_path()).map_err(|e| {
        InterVizError::computation(operation.tool(), format!("cannot read region: {}", e))
    })
}

/// Nearest-cell sampling of `grid` over `region`; cells outside are null
fn resample(grid: &RasterGrid, region: &Region) -> RasterGrid {
    let mut out = RasterGrid::empty(region);
    for row in 0..out.rows {
        for col in 0..out.cols {
            let (x, y) = out.cell_center(row, col);
            if x < grid.west || x >= grid.east || y <= grid.south || y > grid.north {
                continue;
            }
            let src_col = ((x - grid.west) / grid.ewres()) as usize;
            let src_row = ((grid.north - y) / grid.nsres()) as usize;
            out.set(row, col, grid.get(src_row, src_col));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use interviz_core::models::NativeCoord;

    fn extent() -> RasterExtent {
        RasterExtent::new(None, "LOCAL_CS[\"test\"]", [0.0, 0.0, 1000.0, 1000.0], 10.0, 10.0)
            .unwrap()
    }

    async fn setup(dir: &Path, engine: &MemoryEngine) -> EngineSpace {
        let dem = dir.join("dem.tif");
        fs::write(&dem, b"dem").unwrap();
        engine.create_location(dir, "loc", &extent(), &dem).await.unwrap();

        let space = EngineSpace {
            gisdbase: dir.to_path_buf(),
            location: "loc".to_string(),
            mapset: "PERMANENT".to_string(),
            gisrc: dir.join("gisrc"),
        };
        engine.link_raster(&space, &dem, "REFERENCE_LAYER").await.unwrap();
        space
    }

    fn viewshed_request(output: &str) -> ViewshedRequest {
        ViewshedRequest {
            elevation: "REFERENCE_LAYER".to_string(),
            coord: NativeCoord::new(500.0, 500.0),
            observer_height: 1.6,
            target_height: 0.0,
            max_distance: 100.0,
            output: output.to_string(),
        }
    }

    #[tokio::test]
    async fn test_viewshed_export_remove() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let space = setup(dir.path(), &engine).await;

        engine.viewshed(&space, &viewshed_request("out")).await.unwrap();
        assert_eq!(engine.layers_in(&space), vec!["out".to_string()]);

        let path = dir.path().join("out.asc");
        engine.export_raster(&space, "out", &path).await.unwrap();
        let grid = RasterGrid::parse_grass_ascii(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!((grid.rows, grid.cols), (100, 100));
        let visible = grid.cells.iter().filter(|c| **c == Some(1.0)).count();
        // disk of radius 100 at 10 m resolution
        assert!((300..330).contains(&visible), "visible = {}", visible);

        engine.remove_raster(&space, "out").await.unwrap();
        engine.remove_raster(&space, "out").await.unwrap();
        assert_eq!(engine.layer_count(), 0);
    }

    #[tokio::test]
    async fn test_export_is_clipped_to_active_region() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let space = setup(dir.path(), &engine).await;

        engine.viewshed(&space, &viewshed_request("out")).await.unwrap();
        let window = Region::window(NativeCoord::new(500.0, 500.0), 50.0, 10.0, 10.0);
        engine.set_region(&space, &window).await.unwrap();

        let path = dir.path().join("out.asc");
        engine.export_raster(&space, "out", &path).await.unwrap();
        let grid = RasterGrid::parse_grass_ascii(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!((grid.rows, grid.cols), (10, 10));
        assert!(grid.cells.iter().all(|c| *c == Some(1.0)));
    }

    #[tokio::test]
    async fn test_missing_reference_layer() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let space = setup(dir.path(), &engine).await;

        let mut request = viewshed_request("out");
        request.elevation = "missing".to_string();
        assert!(engine.viewshed(&space, &request).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let space = setup(dir.path(), &engine).await;

        engine.fail_on(Operation::Viewshed);
        let err = engine.viewshed(&space, &viewshed_request("out")).await.unwrap_err();
        assert!(err.to_string().starts_with("r.viewshed failed"));
        assert_eq!(engine.layer_count(), 0);

        engine.clear_failures();
        engine.viewshed(&space, &viewshed_request("out")).await.unwrap();
        assert_eq!(engine.observations().len(), 1);
    }

    #[tokio::test]
    async fn test_create_location_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        setup(dir.path(), &engine).await;

        let dem = dir.path().join("dem.tif");
        let err = engine.create_location(dir.path(), "loc", &extent(), &dem).await.unwrap_err();
        assert!(matches!(err, InterVizError::Bootstrap { .. }));
    }
}
