//! Raster metadata extraction.
//!
//! Bounds, resolution and CRS of the elevation raster are read once at
//! startup from `gdalinfo -json`.

use interviz_core::error::{InterVizError, Result};
use interviz_core::models::RasterExtent;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct GdalInfo {
    size: [usize; 2],
    #[serde(rename = "geoTransform")]
    geo_transform: [f64; 6],
    #[serde(rename = "coordinateSystem")]
    coordinate_system: Option<CoordinateSystem>,
    stac: Option<Stac>,
}

#[derive(Debug, Deserialize)]
struct CoordinateSystem {
    wkt: String,
}

#[derive(Debug, Deserialize)]
struct Stac {
    #[serde(rename = "proj:epsg")]
    proj_epsg: Option<u32>,
}

/// Read the extent of `path` by running `gdalinfo -json`
pub async fn read_extent(gdalinfo: &str, path: &Path) -> Result<RasterExtent> {
    let output = Command::new(gdalinfo)
        .arg("-json")
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| InterVizError::bootstrap(format!("cannot run {}: {}", gdalinfo, e)))?;

    if !output.status.success() {
        return Err(InterVizError::bootstrap(format!(
            "{} could not read {}: {}",
            gdalinfo,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let extent = parse_gdalinfo(&String::from_utf8_lossy(&output.stdout))?;
    tracing::info!(
        "Raster {} in {}: w={} s={} e={} n={} res={}x{}",
        path.display(),
        extent.epsg.map(|c| format!("EPSG:{}", c)).unwrap_or_else(|| "custom CRS".to_string()),
        extent.west,
        extent.south,
        extent.east,
        extent.north,
        extent.ewres,
        extent.nsres
    );
    Ok(extent)
}

/// Build a [`RasterExtent`] from `gdalinfo -json` output
pub fn parse_gdalinfo(json: &str) -> Result<RasterExtent> {
    let info: GdalInfo = serde_json::from_str(json)
        .map_err(|e| InterVizError::bootstrap(format!("unreadable raster metadata: {}", e)))?;

    let [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height] =
        info.geo_transform;
    if row_rotation != 0.0 || col_rotation != 0.0 {
        return Err(InterVizError::bootstrap("rotated rasters are not supported"));
    }

    let [width, height] = info.size;
    let far_x = origin_x + pixel_width * width as f64;
    let far_y = origin_y + pixel_height * height as f64;

    let wkt = info.coordinate_system.map(|cs| cs.wkt).unwrap_or_default();
    let epsg = info.stac.and_then(|s| s.proj_epsg).or_else(|| epsg_from_wkt(&wkt));
    if epsg.is_none() && wkt.is_empty() {
        return Err(InterVizError::bootstrap("raster has no coordinate system"));
    }

    RasterExtent::from_raw_bounds(
        epsg,
        wkt,
        [
            origin_x.min(far_x),
            origin_y.min(far_y),
            origin_x.max(far_x),
            origin_y.max(far_y),
        ],
        pixel_width.abs(),
        pixel_height.abs(),
    )
}

/// EPSG code of the outermost CRS in a WKT string, if it has one.
///
/// The top-level identifier is the last one in both WKT1 (`AUTHORITY`) and
/// WKT2 (`ID`) layouts.
fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let wkt2 = wkt.rfind("ID[\"EPSG\",").map(|i| i + "ID[\"EPSG\",".len());
    let wkt1 = wkt.rfind("AUTHORITY[\"EPSG\",\"").map(|i| i + "AUTHORITY[\"EPSG\",\"".len());
    let start = match (wkt2, wkt1) {
        (Some(a), Some(b)) => a.max(b),
        (a, b) => a.or(b)?,
    };
    let digits: String = wkt[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
