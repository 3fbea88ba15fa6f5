//! Reading and writing mapset region files (`WIND`).
//!
//! The engine stores a mapset's active region as `key: value` lines. Only
//! the 2D bounds and resolutions are interpreted here.

use interviz_core::error::{InterVizError, Result};
use interviz_core::models::Region;
use std::fs;
use std::path::Path;

/// Read the region stored in a `WIND` file
pub fn read_region(path: &Path) -> Result<Region> {
    let content = fs::read_to_string(path)?;
    parse_region(&content)
}

/// Write `region` to a `WIND` file, replacing it
pub fn write_region(path: &Path, region: &Region) -> Result<()> {
    fs::write(path, format_region(region))?;
    Ok(())
}

pub fn parse_region(content: &str) -> Result<Region> {
    let mut north = None;
    let mut south = None;
    let mut east = None;
    let mut west = None;
    let mut nsres = None;
    let mut ewres = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "north" => &mut north,
            "south" => &mut south,
            "east" => &mut east,
            "west" => &mut west,
            "n-s resol" => &mut nsres,
            "e-w resol" => &mut ewres,
            _ => continue,
        };
        let parsed: f64 = value.trim().parse().map_err(|_| {
            InterVizError::computation("region", format!("invalid WIND entry '{}'", line.trim()))
        })?;
        *slot = Some(parsed);
    }

    let require = |value: Option<f64>, key: &str| {
        value.ok_or_else(|| {
            InterVizError::computation("region", format!("WIND file has no '{}' entry", key))
        })
    };

    Ok(Region {
        north: require(north, "north")?,
        south: require(south, "south")?,
        east: require(east, "east")?,
        west: require(west, "west")?,
        nsres: require(nsres, "n-s resol")?,
        ewres: require(ewres, "e-w resol")?,
    })
}

pub fn format_region(region: &Region) -> String {
    format!(
        "proj:       99\n\
         zone:       0\n\
         north:      {}\n\
         south:      {}\n\
         east:       {}\n\
         west:       {}\n\
         cols:       {}\n\
         rows:       {}\n\
         e-w resol:  {}\n\
         n-s resol:  {}\n\
         top:        1\n\
         bottom:     0\n\
         cols3:      {}\n\
         rows3:      {}\n\
         depths:     1\n\
         e-w resol3: {}\n\
         n-s resol3: {}\n\
         t-b resol:  1\n",
        region.north,
        region.south,
        region.east,
        region.west,
        region.cols(),
        region.rows(),
        region.ewres,
        region.nsres,
        region.cols(),
        region.rows(),
        region.ewres,
        region.nsres,
    )
}
