//! Raster to vector extraction.
//!
//! Cells equal to the target value are grouped into 4-connected regions.
//! Each region becomes one (multi)polygon in the grid's native coordinates.
//! Holes are preserved. A region is built as the union of its row runs.

use geo::{coord, unary_union, MultiPolygon, Polygon, Rect};

use crate::raster::RasterGrid;

/// A connected region of equal-valued cells
#[derive(Debug, Clone)]
pub struct Shape {
    pub geometry: MultiPolygon<f64>,
    pub value: f64,
    pub cell_count: usize,
}

/// Extract every 4-connected region whose cells equal `target` exactly.
///
/// Regions are returned in scan order of their first (north-west most) cell.
pub fn polygonize(grid: &RasterGrid, target: f64) -> Vec<Shape> {
    let labels = label_regions(grid, target);
    let region_count = labels.iter().flatten().max().map(|max| max + 1).unwrap_or(0);

    let mut runs: Vec<Vec<Polygon<f64>>> = vec![Vec::new(); region_count];
    let mut cell_counts = vec![0usize; region_count];

    for row in 0..grid.rows {
        let mut col = 0;
        while col < grid.cols {
            let Some(label) = labels[row * grid.cols + col] else {
                col += 1;
                continue;
            };

            let start = col;
            while col < grid.cols && labels[row * grid.cols + col] == Some(label) {
                col += 1;
            }

            runs[label].push(run_polygon(grid, row, start, col));
            cell_counts[label] += col - start;
        }
    }

    tracing::debug!(
        regions = region_count,
        rows = grid.rows,
        cols = grid.cols,
        "Polygonized raster"
    );

    runs.into_iter()
        .zip(cell_counts)
        .map(|(polygons, cell_count)| Shape {
            geometry: merge_runs(polygons),
            value: target,
            cell_count,
        })
        .collect()
}

/// Assign a region label to every matching cell, flood-filling in scan order
fn label_regions(grid: &RasterGrid, target: f64) -> Vec<Option<usize>> {
    let mut labels: Vec<Option<usize>> = vec![None; grid.rows * grid.cols];
    let mut next_label = 0;
    let mut stack = Vec::new();

    for start in 0..labels.len() {
        if labels[start].is_some() || grid.cells[start] != Some(target) {
            continue;
        }

        labels[start] = Some(next_label);
        stack.push(start);

        while let Some(index) = stack.pop() {
            let row = index / grid.cols;
            let col = index % grid.cols;

            let mut neighbours = [None; 4];
            if row > 0 {
                neighbours[0] = Some(index - grid.cols);
            }
            if row + 1 < grid.rows {
                neighbours[1] = Some(index + grid.cols);
            }
            if col > 0 {
                neighbours[2] = Some(index - 1);
            }
            if col + 1 < grid.cols {
                neighbours[3] = Some(index + 1);
            }

            for neighbour in neighbours.into_iter().flatten() {
                if labels[neighbour].is_none() && grid.cells[neighbour] == Some(target) {
                    labels[neighbour] = Some(next_label);
                    stack.push(neighbour);
                }
            }
        }

        next_label += 1;
    }

    labels
}

/// Rectangle covering cells `[start, end)` of a row
fn run_polygon(grid: &RasterGrid, row: usize, start: usize, end: usize) -> Polygon<f64> {
    let ewres = grid.ewres();
    let nsres = grid.nsres();
    Rect::new(
        coord! { x: grid.west + start as f64 * ewres, y: grid.north - (row + 1) as f64 * nsres },
        coord! { x: grid.west + end as f64 * ewres, y: grid.north - row as f64 * nsres },
    )
    .to_polygon()
}

fn merge_runs(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    if polygons.len() == 1 {
        return MultiPolygon::new(polygons);
    }
    unary_union(&polygons)
}
