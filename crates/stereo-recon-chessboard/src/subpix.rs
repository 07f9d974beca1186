//! Iterative sub-pixel corner refinement.
//!
//! Every image gradient inside the window is orthogonal to the vector from
//! the true corner to its pixel. The corner is the least-squares solution of
//! `sum(g g^T) (p - q) = 0`, re-solved around the updated estimate until it
//! moves less than `epsilon` or `max_iterations` is reached.

use crate::params::SubPixParams;
use nalgebra::Point2;
use rayon::prelude::*;
use stereo_recon_core::{sample_bilinear, GrayImageView};

fn window_weights(half: i32) -> Vec<f64> {
    let inv = 1.0 / (half * half) as f64;
    let mut w = Vec::with_capacity(((2 * half + 1) * (2 * half + 1)) as usize);
    for dy in -half..=half {
        for dx in -half..=half {
            w.push((-((dx * dx + dy * dy) as f64) * inv).exp());
        }
    }
    w
}

fn refine_with_weights(
    src: &GrayImageView<'_>,
    initial: Point2<f32>,
    params: &SubPixParams,
    weights: &[f64],
) -> Point2<f32> {
    let half = params.half_window as i32;
    let eps2 = (params.epsilon as f64).powi(2);
    let (mut qx, mut qy) = (initial.x as f64, initial.y as f64);

    for _ in 0..params.max_iterations {
        let (mut a, mut b, mut c) = (0.0f64, 0.0f64, 0.0f64);
        let (mut bx, mut by) = (0.0f64, 0.0f64);
        let mut k = 0;
        for dy in -half..=half {
            for dx in -half..=half {
                let px = (qx + dx as f64) as f32;
                let py = (qy + dy as f64) as f32;
                let gx = 0.5 * (sample_bilinear(src, px + 1.0, py) - sample_bilinear(src, px - 1.0, py));
                let gy = 0.5 * (sample_bilinear(src, px, py + 1.0) - sample_bilinear(src, px, py - 1.0));
                let (gx, gy) = (gx as f64, gy as f64);
                let m = weights[k];
                k += 1;

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bx += gxx * dx as f64 + gxy * dy as f64;
                by += gxy * dx as f64 + gyy * dy as f64;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            break;
        }
        let sx = (c * bx - b * by) / det;
        let sy = (a * by - b * bx) / det;
        qx += sx;
        qy += sy;
        if sx * sx + sy * sy <= eps2 {
            break;
        }
    }

    let q = Point2::new(qx as f32, qy as f32);
    let wandered = (q.x - initial.x).abs() > half as f32 || (q.y - initial.y).abs() > half as f32;
    if wandered || !q.x.is_finite() || !q.y.is_finite() {
        initial
    } else {
        q
    }
}

/// Refine one corner. A corner that drifts out of its window keeps its
/// initial position.
pub fn refine_corner(src: &GrayImageView<'_>, initial: Point2<f32>, params: &SubPixParams) -> Point2<f32> {
    if params.half_window == 0 || params.max_iterations == 0 {
        return initial;
    }
    let weights = window_weights(params.half_window as i32);
    refine_with_weights(src, initial, params, &weights)
}

/// Refine all corners in place.
pub fn refine_corners(src: &GrayImageView<'_>, corners: &mut [Point2<f32>], params: &SubPixParams) {
    if params.half_window == 0 || params.max_iterations == 0 {
        return;
    }
    let weights = window_weights(params.half_window as i32);
    corners
        .par_iter_mut()
        .for_each(|p| *p = refine_with_weights(src, *p, params, &weights));
}
