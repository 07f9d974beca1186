use crate::ImageSize;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Planar checkerboard described by its interior corner grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pattern {
    /// Interior corners per row (W).
    pub cols: usize,
    /// Interior corners per column (H).
    pub rows: usize,
    /// Metric side length of one square.
    pub square_size: f64,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            cols: 7,
            rows: 5,
            square_size: 0.02875,
        }
    }
}

impl Pattern {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Self {
        Self {
            cols,
            rows,
            square_size,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Board-frame corner positions (z = 0), row-major.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let s = self.square_size;
        (0..self.rows)
            .flat_map(|j| (0..self.cols).map(move |i| Point3::new(i as f64 * s, j as f64 * s, 0.0)))
            .collect()
    }
}

/// Detected corners, index-aligned with [`Pattern::object_points`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub cols: usize,
    pub rows: usize,
    pub points: Vec<Point2<f64>>,
}

impl CornerSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, col: usize, row: usize) -> Option<Point2<f64>> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.points.get(row * self.cols + col).copied()
    }

    pub fn in_bounds(&self, size: ImageSize) -> bool {
        let max_x = size.width.saturating_sub(1) as f64;
        let max_y = size.height.saturating_sub(1) as f64;
        self.points
            .iter()
            .all(|p| p.x >= 0.0 && p.y >= 0.0 && p.x <= max_x && p.y <= max_y)
    }
}
