use serde::{Deserialize, Serialize};

use super::extent::RasterExtent;
use super::job::NativeCoord;

/// Computational region the engine evaluates layers against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub nsres: f64,
    pub ewres: f64,
}

impl Region {
    /// The full raster region
    pub fn from_extent(extent: &RasterExtent) -> Self {
        Self {
            north: extent.north,
            south: extent.south,
            east: extent.east,
            west: extent.west,
            nsres: extent.nsres,
            ewres: extent.ewres,
        }
    }

    /// Square window of side `2 * half_side` centered on `center`
    pub fn window(center: NativeCoord, half_side: f64, ewres: f64, nsres: f64) -> Self {
        Self {
            north: center.y + half_side,
            south: center.y - half_side,
            east: center.x + half_side,
            west: center.x - half_side,
            nsres,
            ewres,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn rows(&self) -> usize {
        (self.height() / self.nsres).round().max(0.0) as usize
    }

    pub fn cols(&self) -> usize {
        (self.width() / self.ewres).round().max(0.0) as usize
    }
}
