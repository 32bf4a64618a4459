//! Spatial hashing grid for radius queries over a fixed set of points.

use crate::network::Coord;
use std::collections::HashMap;

/// Uniform grid over a snapshot of points.
///
/// Points are bucketed into square cells; a radius query only visits the
/// cells overlapping the query's bounding box.
pub struct SpatialGrid {
    cell_size: f64,
    points: Vec<Coord>,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    /// Build a grid over `points` sized for queries of radius `radius`.
    pub fn new(points: Vec<Coord>, radius: f64) -> Self {
        let cell_size = if radius > 0.0 { radius } else { 1.0 };
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (idx, point) in points.iter().enumerate() {
            cells
                .entry(cell_of(point.x, point.y, cell_size))
                .or_default()
                .push(idx);
        }
        Self {
            cell_size,
            points,
            cells,
        }
    }

    /// Indices of all points within `radius` of `center`, in ascending order.
    pub fn query_radius(&self, center: Coord, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        if radius < 0.0 || !radius.is_finite() {
            return found;
        }
        let (x_min, y_min) = cell_of(center.x - radius, center.y - radius, self.cell_size);
        let (x_max, y_max) = cell_of(center.x + radius, center.y + radius, self.cell_size);
        for cx in x_min..=x_max {
            for cy in y_min..=y_max {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                found.extend(
                    bucket
                        .iter()
                        .copied()
                        .filter(|&idx| self.points[idx].distance(&center) <= radius),
                );
            }
        }
        found.sort_unstable();
        found
    }
}

fn cell_of(x: f64, y: f64, cell_size: f64) -> (i64, i64) {
    (
        (x / cell_size).floor() as i64,
        (y / cell_size).floor() as i64,
    )
}
