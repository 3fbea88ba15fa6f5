use async_trait::async_trait;
use interviz_core::error::Result;
use interviz_core::models::{NativeCoord, RasterExtent, Region, SunDateTime};
use std::path::{Path, PathBuf};

/// Addressing of one engine session: which database, location and mapset
/// the engine commands run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSpace {
    pub gisdbase: PathBuf,
    pub location: String,
    pub mapset: String,
    /// Session file handed to every engine process (`GISRC`)
    pub gisrc: PathBuf,
}

impl EngineSpace {
    pub fn location_path(&self) -> PathBuf {
        self.gisdbase.join(&self.location)
    }

    pub fn mapset_path(&self) -> PathBuf {
        self.location_path().join(&self.mapset)
    }

    /// File holding the mapset's active region
    pub fn wind_path(&self) -> PathBuf {
        self.mapset_path().join("WIND")
    }

    /// Contents of the `GISRC` session file
    pub fn gisrc_contents(&self) -> String {
        format!(
            "GISDBASE: {}\nLOCATION_NAME: {}\nMAPSET: {}\nGUI: text\n",
            self.gisdbase.display(),
            self.location,
            self.mapset
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewshedRequest {
    pub elevation: String,
    pub coord: NativeCoord,
    pub observer_height: f64,
    pub target_height: f64,
    pub max_distance: f64,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SunmaskRequest {
    pub elevation: String,
    pub datetime: SunDateTime,
    pub timezone: i32,
    pub output: String,
}

/// Port for the geoprocessing engine.
///
/// Every call runs against the region stored in `space`'s mapset. Failures
/// carry the tool's diagnostic output.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create a new location in `gisdbase` matching the raster's CRS
    async fn create_location(
        &self,
        gisdbase: &Path,
        location: &str,
        extent: &RasterExtent,
        raster: &Path,
    ) -> Result<()>;

    /// Register an external raster as a read-only layer
    async fn link_raster(&self, space: &EngineSpace, raster: &Path, layer: &str) -> Result<()>;

    /// Replace the mapset's active region
    async fn set_region(&self, space: &EngineSpace, region: &Region) -> Result<()>;

    /// Compute a binary visibility layer
    async fn viewshed(&self, space: &EngineSpace, request: &ViewshedRequest) -> Result<()>;

    /// Compute a binary sun/shadow layer
    async fn sunmask(&self, space: &EngineSpace, request: &SunmaskRequest) -> Result<()>;

    /// Write a layer, clipped to the active region, as a GRASS ASCII raster
    async fn export_raster(&self, space: &EngineSpace, layer: &str, output: &Path) -> Result<()>;

    /// Delete a layer from the mapset; missing layers are not an error
    async fn remove_raster(&self, space: &EngineSpace, layer: &str) -> Result<()>;
}
