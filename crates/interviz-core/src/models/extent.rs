use serde::{Deserialize, Serialize};

use crate::error::{InterVizError, Result};

/// Geographic extent and projection of the loaded elevation raster.
///
/// Computed once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterExtent {
    /// EPSG code of the native CRS, when the raster declares one
    pub epsg: Option<u32>,

    /// Full definition of the native CRS (WKT)
    pub crs_definition: String,

    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,

    /// Horizontal resolution (east-west cell size)
    pub ewres: f64,

    /// Vertical resolution (north-south cell size)
    pub nsres: f64,
}

impl RasterExtent {
    /// Build an extent, checking its invariants.
    pub fn new(
        epsg: Option<u32>,
        crs_definition: impl Into<String>,
        bounds: [f64; 4],
        ewres: f64,
        nsres: f64,
    ) -> Result<Self> {
        let [west, south, east, north] = bounds;

        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(InterVizError::InvalidExtent {
                reason: format!("bounds must be finite, got {:?}", bounds),
            });
        }
        if west >= east {
            return Err(InterVizError::InvalidExtent {
                reason: format!("west ({}) must be lower than east ({})", west, east),
            });
        }
        if south >= north {
            return Err(InterVizError::InvalidExtent {
                reason: format!("south ({}) must be lower than north ({})", south, north),
            });
        }
        if !(ewres > 0.0) || !(nsres > 0.0) {
            return Err(InterVizError::InvalidExtent {
                reason: format!("resolution must be positive, got ewres={} nsres={}", ewres, nsres),
            });
        }

        Ok(Self {
            epsg,
            crs_definition: crs_definition.into(),
            west,
            south,
            east,
            north,
            ewres,
            nsres,
        })
    }

    /// Build an extent from raw raster bounds, snapped to whole units.
    ///
    /// West and south are rounded up, east and north rounded down, so the
    /// snapped box always lies within the raster.
    pub fn from_raw_bounds(
        epsg: Option<u32>,
        crs_definition: impl Into<String>,
        raw: [f64; 4],
        ewres: f64,
        nsres: f64,
    ) -> Result<Self> {
        let [west, south, east, north] = raw;
        Self::new(
            epsg,
            crs_definition,
            [west.ceil(), south.ceil(), east.floor(), north.floor()],
            ewres,
            nsres,
        )
    }

    /// Identifier understood by PROJ: `EPSG:<code>` or the raw definition
    pub fn crs_identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => self.crs_definition.clone(),
        }
    }

    /// True if the point lies strictly inside the bounds (edges excluded)
    pub fn contains_strict(&self, x: f64, y: f64) -> bool {
        x > self.west && x < self.east && y > self.south && y < self.north
    }

    pub fn bounds(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}
