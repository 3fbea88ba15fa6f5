//! Engine workspace lifecycle.
//!
//! At startup a fresh location is created under `<temp_root>/grassdata`, the
//! elevation raster is linked into it as [`REFERENCE_LAYER`] and the
//! `PERMANENT` region is set to the full raster extent. Engine sessions and
//! per-job mapsets are handed out from here, and the whole tree is removed
//! on shutdown.
//!
//! ```text
//! <temp_root>/grassdata/
//!     <location>/            engine location
//!         PERMANENT/         shared mapset, full region
//!         job_<id>/          per-job clone (isolated policy)
//!     <location>_run/
//!         gisrc/             one session file per worker or job
//!         scratch/           exported rasters
//! ```

use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{JobId, RasterExtent, Region};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::ports::{Engine, EngineSpace};
use crate::wind;

/// Name of the elevation layer inside the engine
pub const REFERENCE_LAYER: &str = "REFERENCE_LAYER";

/// Mapset holding the reference layer and the full region
pub const PERMANENT: &str = "PERMANENT";

#[derive(Debug)]
pub struct Workspace {
    gisdbase: PathBuf,
    location: String,
    extent: RasterExtent,
}

impl Workspace {
    /// Create a fresh location for `dem` and load it as the reference layer.
    ///
    /// Fails if the location directory already exists. A partially created
    /// workspace is removed before the error is returned.
    pub async fn bootstrap(
        engine: &dyn Engine,
        temp_root: &Path,
        dem: &Path,
        extent: RasterExtent,
    ) -> Result<Self> {
        let gisdbase = temp_root.join("grassdata");
        fs::create_dir_all(&gisdbase).map_err(|e| {
            InterVizError::bootstrap(format!("cannot create {}: {}", gisdbase.display(), e))
        })?;

        let location = random_location_name();
        if gisdbase.join(&location).exists() {
            return Err(InterVizError::bootstrap(format!(
                "location {} already exists",
                gisdbase.join(&location).display()
            )));
        }

        let workspace = Self {
            gisdbase,
            location,
            extent,
        };
        match workspace.initialize(engine, dem).await {
            Ok(()) => {
                tracing::info!(
                    "Workspace ready at {} (reference layer {})",
                    workspace.location_path().display(),
                    REFERENCE_LAYER
                );
                Ok(workspace)
            }
            Err(e) => {
                workspace.cleanup();
                Err(match e {
                    InterVizError::Bootstrap { .. } => e,
                    other => InterVizError::bootstrap(other.to_string()),
                })
            }
        }
    }

    async fn initialize(&self, engine: &dyn Engine, dem: &Path) -> Result<()> {
        engine.create_location(&self.gisdbase, &self.location, &self.extent, dem).await?;
        fs::create_dir_all(self.gisrc_dir())?;
        fs::create_dir_all(self.scratch_dir())?;

        let permanent = self.session("bootstrap")?;
        let loaded = async {
            engine.link_raster(&permanent, dem, REFERENCE_LAYER).await?;
            engine.set_region(&permanent, &self.full_region()).await
        }
        .await;
        self.release(&permanent);
        loaded
    }

    pub fn extent(&self) -> &RasterExtent {
        &self.extent
    }

    /// Region covering the whole reference raster
    pub fn full_region(&self) -> Region {
        Region::from_extent(&self.extent)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn location_path(&self) -> PathBuf {
        self.gisdbase.join(&self.location)
    }

    fn run_dir(&self) -> PathBuf {
        self.gisdbase.join(format!("{}_run", self.location))
    }

    fn gisrc_dir(&self) -> PathBuf {
        self.run_dir().join("gisrc")
    }

    /// Directory receiving exported rasters
    pub fn scratch_dir(&self) -> PathBuf {
        self.run_dir().join("scratch")
    }

    /// Export destination of a job's raster
    pub fn export_path(&self, job_id: &JobId) -> PathBuf {
        self.scratch_dir().join(format!("{}.asc", job_id))
    }

    /// Open a session on the shared `PERMANENT` mapset
    pub fn session(&self, name: &str) -> Result<EngineSpace> {
        self.open_space(name, PERMANENT)
    }

    /// Clone `PERMANENT` into a private mapset for one job.
    ///
    /// The clone starts from the current full region and sees the reference
    /// layer through the default mapset search path.
    pub fn isolate(&self, job_id: &JobId) -> Result<EngineSpace> {
        let mapset = job_id.mapset_name();
        let mapset_path = self.location_path().join(&mapset);
        fs::create_dir(&mapset_path)?;

        let source = self.location_path().join(PERMANENT).join("WIND");
        if let Err(e) = fs::copy(&source, mapset_path.join("WIND")) {
            let _ = fs::remove_dir_all(&mapset_path);
            return Err(e.into());
        }

        match self.open_space(&mapset, &mapset) {
            Ok(space) => Ok(space),
            Err(e) => {
                let _ = fs::remove_dir_all(&mapset_path);
                Err(e)
            }
        }
    }

    fn open_space(&self, session: &str, mapset: &str) -> Result<EngineSpace> {
        let space = EngineSpace {
            gisdbase: self.gisdbase.clone(),
            location: self.location.clone(),
            mapset: mapset.to_string(),
            gisrc: self.gisrc_dir().join(session),
        };
        fs::write(&space.gisrc, space.gisrc_contents())?;
        Ok(space)
    }

    /// Drop a session file, and the mapset too when it is a job clone
    pub fn release(&self, space: &EngineSpace) {
        if let Err(e) = fs::remove_file(&space.gisrc) {
            tracing::warn!("Could not remove session file {}: {}", space.gisrc.display(), e);
        }
        if space.mapset != PERMANENT {
            let path = space.mapset_path();
            if let Err(e) = fs::remove_dir_all(&path) {
                tracing::warn!("Could not remove mapset {}: {}", path.display(), e);
            }
        }
    }

    /// Region currently active in `space`
    pub fn active_region(&self, space: &EngineSpace) -> Result<Region> {
        wind::read_region(&space.wind_path())
    }

    /// Region of the shared `PERMANENT` mapset
    pub fn shared_region(&self) -> Result<Region> {
        wind::read_region(&self.location_path().join(PERMANENT).join("WIND"))
    }

    /// Mapsets other than `PERMANENT`; empty once every job has finished
    pub fn job_mapsets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.location_path())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() && name != PERMANENT {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Files left in the scratch directory
    pub fn scratch_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.scratch_dir())? {
            files.push(entry?.path());
        }
        files.sort();
        Ok(files)
    }

    /// Delete the location and every session and scratch file
    pub fn cleanup(&self) {
        for dir in [self.location_path(), self.run_dir()] {
            if dir.exists() {
                match fs::remove_dir_all(&dir) {
                    Ok(()) => tracing::info!("Removed {}", dir.display()),
                    Err(e) => tracing::warn!("Could not remove {}: {}", dir.display(), e),
                }
            }
        }
    }
}

/// 24 random hexadecimal characters
fn random_location_name() -> String {
    let mut name = Uuid::new_v4().simple().to_string();
    name.truncate(24);
    name
}
