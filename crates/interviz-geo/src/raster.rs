//! Single-band raster grids exchanged with the engine as GRASS ASCII files.
//!
//! The format is a `key: value` header (`north`, `south`, `east`, `west`,
//! `rows`, `cols`, optionally `null`) followed by `rows` lines of `cols`
//! whitespace-separated cell values. Null cells are written as `*`.

use interviz_core::error::{InterVizError, Result};
use interviz_core::models::Region;

/// Token written for null cells
pub const NULL_TOKEN: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub rows: usize,
    pub cols: usize,
    /// Row-major cells, north row first
    pub cells: Vec<Option<f64>>,
}

impl RasterGrid {
    /// A grid covering `region`, with every cell null
    pub fn empty(region: &Region) -> Self {
        let rows = region.rows();
        let cols = region.cols();
        Self {
            north: region.north,
            south: region.south,
            east: region.east,
            west: region.west,
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn ewres(&self) -> f64 {
        (self.east - self.west) / self.cols as f64
    }

    pub fn nsres(&self) -> f64 {
        (self.north - self.south) / self.rows as f64
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<f64>) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = value;
        }
    }

    /// Native coordinates of the center of a cell
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.west + (col as f64 + 0.5) * self.ewres(),
            self.north - (row as f64 + 0.5) * self.nsres(),
        )
    }

    /// Parse a GRASS ASCII raster
    pub fn parse_grass_ascii(content: &str) -> Result<Self> {
        let mut north = None;
        let mut south = None;
        let mut east = None;
        let mut west = None;
        let mut rows = None;
        let mut cols = None;
        let mut null_token = NULL_TOKEN.to_string();

        let mut lines = content.lines().peekable();
        while let Some(line) = lines.peek() {
            let Some((key, value)) = line.split_once(':') else {
                break;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            match key.as_str() {
                "north" => north = Some(parse_header_number(&key, value)?),
                "south" => south = Some(parse_header_number(&key, value)?),
                "east" => east = Some(parse_header_number(&key, value)?),
                "west" => west = Some(parse_header_number(&key, value)?),
                "rows" => rows = Some(parse_header_count(&key, value)?),
                "cols" => cols = Some(parse_header_count(&key, value)?),
                "null" => null_token = value.to_string(),
                // type, multiplier: not needed to read values back
                _ => {}
            }
            lines.next();
        }

        let missing = |key: &str| malformed(format!("missing header '{}'", key));
        let north = north.ok_or_else(|| missing("north"))?;
        let south = south.ok_or_else(|| missing("south"))?;
        let east = east.ok_or_else(|| missing("east"))?;
        let west = west.ok_or_else(|| missing("west"))?;
        let rows = rows.ok_or_else(|| missing("rows"))?;
        let cols = cols.ok_or_else(|| missing("cols"))?;

        if north <= south || east <= west || rows == 0 || cols == 0 {
            return Err(malformed(format!(
                "degenerate grid: n={} s={} e={} w={} rows={} cols={}",
                north, south, east, west, rows, cols
            )));
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for token in lines.flat_map(str::split_whitespace) {
            if token == null_token || token == NULL_TOKEN {
                cells.push(None);
            } else {
                let value: f64 = token
                    .parse()
                    .map_err(|_| malformed(format!("invalid cell value '{}'", token)))?;
                cells.push(if value.is_nan() { None } else { Some(value) });
            }
        }

        if cells.len() != rows * cols {
            return Err(malformed(format!(
                "expected {} cells ({} x {}), found {}",
                rows * cols,
                rows,
                cols,
                cells.len()
            )));
        }

        Ok(Self {
            north,
            south,
            east,
            west,
            rows,
            cols,
            cells,
        })
    }

    /// Serialize as a GRASS ASCII raster
    pub fn to_grass_ascii(&self) -> String {
        let mut out = format!(
            "north: {}\nsouth: {}\neast: {}\nwest: {}\nrows: {}\ncols: {}\n",
            self.north, self.south, self.east, self.west, self.rows, self.cols
        );

        for row in self.cells.chunks(self.cols.max(1)) {
            let line: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(v) => v.to_string(),
                    None => NULL_TOKEN.to_string(),
                })
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }

        out
    }
}

fn malformed(reason: String) -> InterVizError {
    InterVizError::computation("raster parsing", reason)
}

fn parse_header_number(key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| malformed(format!("invalid value '{}' for '{}'", value, key)))
}

fn parse_header_count(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| malformed(format!("invalid value '{}' for '{}'", value, key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "north: 30\nsouth: 0\neast: 20\nwest: 0\nrows: 3\ncols: 2\n\
                          1 0\n* 1\n1 1\n";

    #[test]
    fn test_parse_sample() {
        let grid = RasterGrid::parse_grass_ascii(SAMPLE).unwrap();
        assert_eq!(grid.rows, 3);
        assert_eq!(grid.cols, 2);
        assert_eq!(grid.ewres(), 10.0);
        assert_eq!(grid.nsres(), 10.0);
        assert_eq!(grid.get(0, 0), Some(1.0));
        assert_eq!(grid.get(0, 1), Some(0.0));
        assert_eq!(grid.get(1, 0), None);
        assert_eq!(grid.get(2, 1), Some(1.0));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.cell_center(0, 0), (5.0, 25.0));
    }

    #[test]
    fn test_custom_null_token() {
        let content = "north: 1\nsouth: 0\neast: 2\nwest: 0\nrows: 1\ncols: 2\nnull: -9999\n-9999 1\n";
        let grid = RasterGrid::parse_grass_ascii(content).unwrap();
        assert_eq!(grid.cells, vec![None, Some(1.0)]);
    }

    #[test]
    fn test_serialization_is_readable_back() {
        let grid = RasterGrid::parse_grass_ascii(SAMPLE).unwrap();
        let reparsed = RasterGrid::parse_grass_ascii(&grid.to_grass_ascii()).unwrap();
        assert_eq!(grid, reparsed);
    }

    #[test]
    fn test_rejects_truncated_data() {
        let content = "north: 30\nsouth: 0\neast: 20\nwest: 0\nrows: 3\ncols: 2\n1 0\n";
        assert!(RasterGrid::parse_grass_ascii(content).is_err());
    }

    #[test]
    fn test_rejects_missing_header() {
        let content = "north: 30\nsouth: 0\neast: 20\nrows: 1\ncols: 1\n1\n";
        let err = RasterGrid::parse_grass_ascii(content).unwrap_err();
        assert!(err.to_string().contains("west"));
    }
}
