//! CRS transformation between geographic and native raster coordinates

use interviz_core::error::{InterVizError, Result};
use interviz_core::models::RasterExtent;
use proj::Proj;
use std::sync::Mutex;

/// CRS used at the HTTP boundary
pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";

/// Projects geographic coordinates into the native CRS
pub trait ToNative {
    fn to_native(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;
}

/// Projects native coordinates back to geographic ones
pub trait ToGeographic {
    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// Forward and inverse transforms bound to the raster's native CRS.
///
/// `Proj` handles are not `Sync`; each direction sits behind its own mutex,
/// held for the duration of a single conversion.
pub struct GeoTransform {
    native_crs: String,
    forward: Mutex<Proj>,
    inverse: Mutex<Proj>,
}

impl GeoTransform {
    /// Create transforms between EPSG:4326 and `native_crs`
    pub fn new(native_crs: &str) -> Result<Self> {
        let forward = Proj::new_known_crs(GEOGRAPHIC_CRS, native_crs, None).map_err(|e| {
            InterVizError::ConfigInvalid {
                key: "crs".to_string(),
                reason: format!(
                    "Failed to create projection from {} to {}: {}",
                    GEOGRAPHIC_CRS, native_crs, e
                ),
            }
        })?;

        let inverse = Proj::new_known_crs(native_crs, GEOGRAPHIC_CRS, None).map_err(|e| {
            InterVizError::ConfigInvalid {
                key: "crs".to_string(),
                reason: format!(
                    "Failed to create projection from {} to {}: {}",
                    native_crs, GEOGRAPHIC_CRS, e
                ),
            }
        })?;

        Ok(Self {
            native_crs: native_crs.to_string(),
            forward: Mutex::new(forward),
            inverse: Mutex::new(inverse),
        })
    }

    /// Transforms for the CRS of a loaded raster
    pub fn for_extent(extent: &RasterExtent) -> Result<Self> {
        Self::new(&extent.crs_identifier())
    }
}

impl std::fmt::Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTransform").field("native_crs", &self.native_crs).finish()
    }
}

impl ToNative for GeoTransform {
    fn to_native(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        // A panic mid-conversion leaves no partial state in the handle
        let proj = self.forward.lock().unwrap_or_else(|e| e.into_inner());
        proj.convert((lon, lat)).map_err(|e| {
            InterVizError::parameter(
                "coordinates",
                format!("({}, {}) cannot be projected to {}: {}", lat, lon, self.native_crs, e),
            )
        })
    }
}

impl ToGeographic for GeoTransform {
    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let proj = self.inverse.lock().unwrap_or_else(|e| e.into_inner());
        proj.convert((x, y)).map_err(|e| {
            InterVizError::computation("reprojection", format!("({}, {}): {}", x, y, e))
        })
    }
}
