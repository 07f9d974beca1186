use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;
use crate::corners::find_corners;
use crate::subpix::refine_corners;
use log::debug;
use nalgebra::{Point2, Vector2};
use std::collections::HashMap;
use stereo_recon_core::{estimate_homography, CornerSet, GrayImageView, Pattern};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds the W×H interior corners of a checkerboard in one image.
#[derive(Clone, Debug)]
pub struct PatternDetector {
    pub pattern: Pattern,
    pub params: ChessboardParams,
}

/// Every fully populated `cols`×`rows` window of labelled cells, in either
/// orientation, as row-major node indices.
fn grid_windows(cells: &HashMap<(i32, i32), usize>, cols: usize, rows: usize) -> Vec<Vec<usize>> {
    let Some(min_i) = cells.keys().map(|k| k.0).min() else {
        return Vec::new();
    };
    let max_i = cells.keys().map(|k| k.0).max().unwrap_or(min_i);
    let min_j = cells.keys().map(|k| k.1).min().unwrap_or(0);
    let max_j = cells.keys().map(|k| k.1).max().unwrap_or(min_j);

    let orientations: &[bool] = if cols == rows { &[false] } else { &[false, true] };
    let mut windows = Vec::new();
    for &transposed in orientations {
        let (span_i, span_j) = if transposed { (rows, cols) } else { (cols, rows) };
        for j0 in min_j..=max_j - span_j as i32 + 1 {
            'window: for i0 in min_i..=max_i - span_i as i32 + 1 {
                let mut grid = Vec::with_capacity(cols * rows);
                for r in 0..rows as i32 {
                    for c in 0..cols as i32 {
                        let key = if transposed { (i0 + r, j0 + c) } else { (i0 + c, j0 + r) };
                        match cells.get(&key) {
                            Some(&node) => grid.push(node),
                            None => continue 'window,
                        }
                    }
                }
                windows.push(grid);
            }
        }
    }
    windows
}

/// How well a row-major ordering matches "rows run right, columns run down".
fn orientation_score(points: &[Point2<f32>], cols: usize, rows: usize) -> f32 {
    let mut u = Vector2::zeros();
    for r in 0..rows {
        u += points[r * cols + cols - 1] - points[r * cols];
    }
    let mut v = Vector2::zeros();
    for c in 0..cols {
        v += points[(rows - 1) * cols + c] - points[c];
    }
    let (un, vn) = (u.norm(), v.norm());
    if un <= f32::EPSILON || vn <= f32::EPSILON {
        return f32::NEG_INFINITY;
    }
    u.x / un + v.y / vn
}

/// Reorder a row-major grid so the first corner is top-left in the image and
/// rows run to the right. Flips (and transposes for square grids) are the
/// only symmetries a checkerboard detection cannot tell apart.
fn canonical_order(points: &[Point2<f32>], cols: usize, rows: usize) -> Vec<Point2<f32>> {
    let transposes: &[bool] = if cols == rows { &[false, true] } else { &[false] };
    let mut best: Option<(f32, Vec<Point2<f32>>)> = None;

    for &transpose in transposes {
        for flip_r in [false, true] {
            for flip_c in [false, true] {
                let candidate: Vec<Point2<f32>> = (0..rows)
                    .flat_map(|r| (0..cols).map(move |c| (r, c)))
                    .map(|(r, c)| {
                        let r = if flip_r { rows - 1 - r } else { r };
                        let c = if flip_c { cols - 1 - c } else { c };
                        if transpose {
                            points[c * cols + r]
                        } else {
                            points[r * cols + c]
                        }
                    })
                    .collect();
                let score = orientation_score(&candidate, cols, rows);
                if best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, candidate));
                }
            }
        }
    }
    best.map(|(_, p)| p).unwrap_or_else(|| points.to_vec())
}

impl PatternDetector {
    pub fn new(pattern: Pattern, params: ChessboardParams) -> Self {
        Self { pattern, params }
    }

    /// Largest homography residual must stay below a fraction of the spacing.
    fn grid_is_consistent(&self, points: &[Point2<f32>]) -> bool {
        let (cols, rows) = (self.pattern.cols, self.pattern.rows);
        let ideal: Vec<Point2<f64>> = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| Point2::new(c as f64, r as f64)))
            .collect();
        let observed: Vec<Point2<f64>> = points
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect();
        let Some(h) = estimate_homography(&ideal, &observed) else {
            return false;
        };

        let mut spacing = 0.0f64;
        let mut n = 0usize;
        for r in 0..rows {
            for c in 0..cols {
                let p = observed[r * cols + c];
                if c + 1 < cols {
                    spacing += (observed[r * cols + c + 1] - p).norm();
                    n += 1;
                }
                if r + 1 < rows {
                    spacing += (observed[(r + 1) * cols + c] - p).norm();
                    n += 1;
                }
            }
        }
        if n == 0 || spacing <= 0.0 {
            return false;
        }
        spacing /= n as f64;

        let max_residual = ideal
            .iter()
            .zip(&observed)
            .map(|(g, p)| (h.apply(*g) - p).norm())
            .fold(0.0f64, f64::max);
        debug!(
            "grid residual {:.3}px vs spacing {:.2}px",
            max_residual, spacing
        );
        max_residual <= self.params.max_grid_residual_rel as f64 * spacing
    }

    /// Detect the pattern; `None` is a miss, never an error.
    ///
    /// The result holds exactly `cols * rows` in-bounds corners in row-major
    /// order, aligned with [`Pattern::object_points`].
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, src),
            fields(width = src.width, height = src.height, cols = self.pattern.cols, rows = self.pattern.rows)
        )
    )]
    pub fn detect(&self, src: &GrayImageView<'_>) -> Option<CornerSet> {
        let (cols, rows) = (self.pattern.cols, self.pattern.rows);
        if cols < 2 || rows < 2 {
            return None;
        }
        let expected = cols * rows;

        let corners = find_corners(src, &self.params.chess);
        debug!("{} corner candidates", corners.len());
        if corners.len() < expected {
            return None;
        }

        let graph = GridGraph::new(&corners, &self.params.graph);
        let mut components = connected_components(&graph);
        components.retain(|c| c.len() >= expected);
        components.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

        for component in &components {
            let Some(cells) = assign_grid_coordinates(&corners, &graph, component) else {
                debug!("component of {} corners has conflicting labels", component.len());
                continue;
            };

            let windows = grid_windows(&cells, cols, rows);
            if windows.len() != 1 {
                debug!(
                    "component of {} corners holds {} candidate {}x{} grids",
                    component.len(),
                    windows.len(),
                    cols,
                    rows
                );
                continue;
            }

            let raw: Vec<Point2<f32>> = windows[0].iter().map(|&i| corners[i].position).collect();
            let mut points = canonical_order(&raw, cols, rows);
            if !self.grid_is_consistent(&points) {
                continue;
            }

            refine_corners(src, &mut points, &self.params.subpix);
            let set = CornerSet {
                cols,
                rows,
                points: points
                    .iter()
                    .map(|p| Point2::new(p.x as f64, p.y as f64))
                    .collect(),
            };
            if set.in_bounds(src.size()) {
                return Some(set);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::GrayImage;

    /// Checkerboard with `cols`×`rows` interior corners, top-left square
    /// dark, drawn with an affine map and 4x4 supersampling.
    fn render_board(
        cols: usize,
        rows: usize,
        square: f32,
        angle: f32,
        origin: (f32, f32),
        size: (usize, usize),
    ) -> (GrayImage, Vec<Point2<f32>>) {
        const SS: usize = 4;
        let (s, c) = angle.sin_cos();
        let img = GrayImage::from_fn(size.0, size.1, |x, y| {
            let mut acc = 0u32;
            for sy in 0..SS {
                for sx in 0..SS {
                    let px = x as f32 - 0.5 + (sx as f32 + 0.5) / SS as f32 - origin.0;
                    let py = y as f32 - 0.5 + (sy as f32 + 0.5) / SS as f32 - origin.1;
                    let bx = (c * px + s * py) / square;
                    let by = (-s * px + c * py) / square;
                    let inside = bx >= 0.0 && by >= 0.0 && bx < (cols + 1) as f32 && by < (rows + 1) as f32;
                    let dark = inside && (bx.floor() as i32 + by.floor() as i32) % 2 == 0;
                    acc += if dark { 30 } else { 225 };
                }
            }
            (acc / (SS * SS) as u32) as u8
        });

        let truth = (0..rows)
            .flat_map(|j| (0..cols).map(move |i| (i, j)))
            .map(|(i, j)| {
                let bx = (i + 1) as f32 * square;
                let by = (j + 1) as f32 * square;
                Point2::new(origin.0 + c * bx - s * by, origin.1 + s * bx + c * by)
            })
            .collect();
        (img, truth)
    }

    fn assert_matches(set: &CornerSet, truth: &[Point2<f32>], tol: f64) {
        assert_eq!(set.points.len(), truth.len());
        for (k, (p, t)) in set.points.iter().zip(truth).enumerate() {
            let d = ((p.x - t.x as f64).powi(2) + (p.y - t.y as f64).powi(2)).sqrt();
            assert!(d < tol, "corner {k}: {p:?} vs {t:?}");
        }
    }

    #[test]
    fn detects_axis_aligned_board_in_row_major_order() {
        let (img, truth) = render_board(7, 5, 30.0, 0.0, (40.0, 40.0), (320, 260));
        let detector = PatternDetector::new(Pattern::new(7, 5, 0.03), ChessboardParams::default());
        let set = detector.detect(&img.view()).expect("board");
        assert_eq!((set.cols, set.rows), (7, 5));
        assert_matches(&set, &truth, 0.2);
    }

    #[test]
    fn detects_rotated_board() {
        let (img, truth) = render_board(6, 4, 32.0, 0.2, (90.0, 40.0), (360, 300));
        let detector = PatternDetector::new(Pattern::new(6, 4, 0.03), ChessboardParams::default());
        let set = detector.detect(&img.view()).expect("board");
        assert_matches(&set, &truth, 0.3);
        assert!(set.in_bounds(img.size()));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let (img, _) = render_board(7, 5, 30.0, 0.1, (50.0, 30.0), (340, 260));
        let detector = PatternDetector::new(Pattern::new(7, 5, 0.03), ChessboardParams::default());
        let a = detector.detect(&img.view()).expect("board");
        let b = detector.detect(&img.view()).expect("board");
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_pattern_size_is_a_miss() {
        let (img, _) = render_board(7, 5, 30.0, 0.0, (40.0, 40.0), (320, 260));
        for (cols, rows) in [(6, 5), (8, 5), (7, 6)] {
            let detector = PatternDetector::new(Pattern::new(cols, rows, 0.03), ChessboardParams::default());
            assert!(detector.detect(&img.view()).is_none(), "{cols}x{rows}");
        }
    }

    #[test]
    fn blank_image_is_a_miss() {
        let img = GrayImage::from_fn(200, 150, |x, _| (x % 256) as u8);
        let detector = PatternDetector::new(Pattern::default(), ChessboardParams::default());
        assert!(detector.detect(&img.view()).is_none());
    }

    #[test]
    fn canonical_order_undoes_flips() {
        let pts: Vec<Point2<f32>> = (0..3)
            .flat_map(|r| (0..4).map(move |c| Point2::new(c as f32 * 10.0, r as f32 * 10.0)))
            .collect();
        let flipped: Vec<Point2<f32>> = pts.iter().rev().copied().collect();
        assert_eq!(canonical_order(&flipped, 4, 3), pts);
    }
}
