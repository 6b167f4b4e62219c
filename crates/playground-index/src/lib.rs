//! Spatial indexing abstractions for broad-phase neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from body positions.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit neighbors of `query_idx` within the provided squared radius.
    ///
    /// The visitor receives the neighbor's index and its squared distance.
    /// The query index itself is never visited.
    fn neighbors_within(
        &self,
        query_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Visit all indexed positions within `radius_sq` of an arbitrary point.
    fn neighbors_of_point(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );
}

/// Uniform grid index bucketing positions into fixed-size square cells.
///
/// The grid covers a bounded `width x height` region; positions outside the
/// bounds are clamped into the border cells, so queries near the edges still
/// find them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    cell_size: f32,
    width: f32,
    height: f32,
    cols: usize,
    rows: usize,
    #[serde(skip)]
    buckets: Vec<Vec<usize>>,
    #[serde(skip)]
    positions: Vec<(f32, f32)>,
}

impl UniformGridIndex {
    /// Create a new uniform grid covering `width x height` with square cells.
    #[must_use]
    pub fn new(cell_size: f32, width: f32, height: f32) -> Self {
        let cols = Self::axis_cells(width, cell_size);
        let rows = Self::axis_cells(height, cell_size);
        Self {
            cell_size,
            width,
            height,
            cols,
            rows,
            buckets: vec![Vec::new(); cols * rows],
            positions: Vec::new(),
        }
    }

    fn axis_cells(extent: f32, cell_size: f32) -> usize {
        if extent <= 0.0 || cell_size <= 0.0 {
            1
        } else {
            ((extent / cell_size).ceil() as usize).max(1)
        }
    }

    #[inline]
    fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let col = ((x / self.cell_size).floor() as isize).clamp(0, self.cols as isize - 1) as usize;
        let row = ((y / self.cell_size).floor() as isize).clamp(0, self.rows as isize - 1) as usize;
        (col, row)
    }

    /// Number of positions currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn visit_range(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        skip: Option<usize>,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if self.positions.is_empty() {
            return;
        }
        let radius = radius_sq.max(0.0).sqrt();
        let (min_col, min_row) = self.cell_of(x - radius, y - radius);
        let (max_col, max_row) = self.cell_of(x + radius, y + radius);
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                for &idx in &self.buckets[row * self.cols + col] {
                    if skip == Some(idx) {
                        continue;
                    }
                    let (px, py) = self.positions[idx];
                    let dx = px - x;
                    let dy = py - y;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(idx, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0, 200.0, 200.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if self.cell_size <= 0.0 {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(IndexError::InvalidConfig("grid extent must be positive"));
        }
        if self.buckets.len() != self.cols * self.rows {
            self.buckets = vec![Vec::new(); self.cols * self.rows];
        } else {
            for bucket in &mut self.buckets {
                bucket.clear();
            }
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        for (idx, &(x, y)) in positions.iter().enumerate() {
            let (col, row) = self.cell_of(x, y);
            self.buckets[row * self.cols + col].push(idx);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        query_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        let Some(&(x, y)) = self.positions.get(query_idx) else {
            return;
        };
        self.visit_range(x, y, radius_sq, Some(query_idx), visitor);
    }

    fn neighbors_of_point(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        self.visit_range(x, y, radius_sq, None, visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(index: &UniformGridIndex, query: usize, radius_sq: f32) -> Vec<usize> {
        let mut found = Vec::new();
        index.neighbors_within(query, radius_sq, &mut |idx, _| found.push(idx));
        found.sort_unstable();
        found
    }

    #[test]
    fn rebuild_rejects_bad_cell_size() {
        let mut index = UniformGridIndex::new(0.0, 100.0, 100.0);
        assert!(index.rebuild(&[(1.0, 1.0)]).is_err());
    }

    #[test]
    fn finds_neighbors_within_radius() {
        let mut index = UniformGridIndex::new(10.0, 100.0, 100.0);
        let positions = [(10.0, 10.0), (14.0, 10.0), (40.0, 40.0), (11.0, 12.0)];
        index.rebuild(&positions).expect("rebuild");

        assert_eq!(collect(&index, 0, 25.0), vec![1, 3]);
        assert_eq!(collect(&index, 2, 25.0), Vec::<usize>::new());
    }

    #[test]
    fn never_visits_query_index() {
        let mut index = UniformGridIndex::new(5.0, 50.0, 50.0);
        index
            .rebuild(&[(5.0, 5.0), (5.0, 5.0)])
            .expect("rebuild");
        let found = collect(&index, 0, 1.0);
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn queries_cross_cell_boundaries() {
        let mut index = UniformGridIndex::new(10.0, 100.0, 100.0);
        // Both points straddle the boundary between cell (0,0) and (1,0).
        index
            .rebuild(&[(9.5, 5.0), (10.5, 5.0)])
            .expect("rebuild");
        assert_eq!(collect(&index, 0, 4.0), vec![1]);
    }

    #[test]
    fn out_of_bounds_positions_are_clamped_into_border_cells() {
        let mut index = UniformGridIndex::new(10.0, 50.0, 50.0);
        index
            .rebuild(&[(-5.0, -5.0), (1.0, 1.0)])
            .expect("rebuild");
        let mut found = Vec::new();
        index.neighbors_of_point(0.0, 0.0, 100.0, &mut |idx, _| found.push(idx));
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn point_queries_report_distances() {
        let mut index = UniformGridIndex::new(10.0, 100.0, 100.0);
        index.rebuild(&[(3.0, 4.0)]).expect("rebuild");
        let mut seen = None;
        index.neighbors_of_point(0.0, 0.0, 26.0, &mut |idx, dist_sq| {
            seen = Some((idx, dist_sq.into_inner()));
        });
        let (idx, dist_sq) = seen.expect("neighbor");
        assert_eq!(idx, 0);
        assert!((dist_sq - 25.0).abs() < 1e-6);
    }
}
