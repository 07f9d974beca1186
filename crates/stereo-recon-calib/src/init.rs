//! Closed-form starting point for the joint solve.
//!
//! With the principal point pinned to the image centre and zero skew, every
//! plane homography gives two linear constraints on `1/fx^2` and `1/fy^2`.
//! Poses then follow from `K^-1 H`.

use log::warn;
use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use stereo_recon_core::{CameraIntrinsics, Distortion, Homography, ImageSize};

/// Focal lengths from plane homographies (board plane to pixels), principal
/// point at the image centre, zero distortion.
///
/// Falls back to `max(width, height)` for both focal lengths when the views
/// do not constrain them, e.g. a single view or only fronto-parallel boards.
pub fn initial_intrinsics(homographies: &[Homography], size: ImageSize) -> CameraIntrinsics {
    let cx = (size.width as f64 - 1.0) * 0.5;
    let cy = (size.height as f64 - 1.0) * 0.5;
    let fallback = size.width.max(size.height) as f64;

    match focal_from_homographies(homographies, cx, cy) {
        Some((fx, fy)) => CameraIntrinsics::new(fx, fy, cx, cy, Distortion::default()),
        None => {
            warn!(
                "focal length not observable from {} view(s); starting from {:.0}px",
                homographies.len(),
                fallback
            );
            CameraIntrinsics::new(fallback, fallback, cx, cy, Distortion::default())
        }
    }
}

fn focal_from_homographies(homographies: &[Homography], cx: f64, cy: f64) -> Option<(f64, f64)> {
    let shift_inv = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let mut rows: Vec<[f64; 3]> = Vec::with_capacity(2 * homographies.len());
    for h in homographies {
        let hc = shift_inv * h.h;
        let scale = hc.norm();
        if scale <= f64::EPSILON {
            continue;
        }
        let hc = hc / scale;
        let (h1, h2) = (hc.column(0), hc.column(1));
        // h1^T w h2 = 0 and h1^T w h1 = h2^T w h2 with w = diag(a, b, 1)
        rows.push([h1.x * h2.x, h1.y * h2.y, -h1.z * h2.z]);
        rows.push([
            h1.x * h1.x - h2.x * h2.x,
            h1.y * h1.y - h2.y * h2.y,
            -(h1.z * h1.z - h2.z * h2.z),
        ]);
    }
    if rows.len() < 2 {
        return None;
    }

    let a = DMatrix::from_fn(rows.len(), 2, |i, j| rows[i][j]);
    let b = DVector::from_fn(rows.len(), |i, _| rows[i][2]);

    let svd = a.svd(true, true);
    let sv = &svd.singular_values;
    if sv.min() <= 1e-6 * sv.max().max(f64::EPSILON) {
        return None;
    }
    let ab = svd.solve(&b, 1e-12).ok()?;
    if ab[0] <= 0.0 || ab[1] <= 0.0 {
        return None;
    }
    let (fx, fy) = (1.0 / ab[0].sqrt(), 1.0 / ab[1].sqrt());
    (fx.is_finite() && fy.is_finite()).then_some((fx, fy))
}

/// Board pose in the camera frame from a plane homography.
///
/// The rotation is the nearest orthonormal matrix to `[r1 r2 r1xr2]`; the
/// sign is chosen so the board lies in front of the camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Homography) -> Option<(Rotation3<f64>, Vector3<f64>)> {
    let m = k.try_inverse()? * h.h;
    let (c1, c2, c3) = (m.column(0), m.column(1), m.column(2));
    let n = c1.norm();
    if n <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / n;
    if c3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = c1 * lambda;
    let r2: Vector3<f64> = c2 * lambda;
    let r3 = r1.cross(&r2);
    let t: Vector3<f64> = c3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        r = -r;
    }
    Some((Rotation3::from_matrix_unchecked(r), t))
}

/// Component-wise median; empty input gives zero.
pub(crate) fn median_vector(values: &[Vector3<f64>]) -> Vector3<f64> {
    let mut out = Vector3::zeros();
    if values.is_empty() {
        return out;
    }
    for axis in 0..3 {
        let mut column: Vec<f64> = values.iter().map(|v| v[axis]).collect();
        column.sort_by(|a, b| a.total_cmp(b));
        let mid = column.len() / 2;
        out[axis] = if column.len() % 2 == 0 {
            0.5 * (column[mid - 1] + column[mid])
        } else {
            column[mid]
        };
    }
    out
}
