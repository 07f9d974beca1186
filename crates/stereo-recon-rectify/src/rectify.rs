use crate::error::RectifyError;
use crate::params::RectifyParams;
use log::{debug, warn};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use stereo_recon_core::{
    matrix_to_rodrigues, rodrigues_to_matrix, CalibrationResult, CameraIntrinsics, ImageSize,
};

/// Samples per side of the border grid used to bound the rectified image.
const BOUNDS_GRID: usize = 9;

/// What triangulation needs from the rectified rig.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectifiedGeometry {
    /// Shared focal length of both rectified cameras, pixels.
    pub focal: f64,
    /// Left rectified principal point.
    pub cx: f64,
    pub cy: f64,
    /// Camera centre distance, calibration units.
    pub baseline: f64,
    /// Right minus left principal point x. Zero under the zero-disparity
    /// convention; added to measured disparities otherwise.
    pub disparity_offset: f64,
}

/// Rectifying rotations and projections of both cameras.
///
/// `r1`/`r2` rotate each original camera frame into its rectified frame,
/// `p1`/`p2` project rectified-frame points (left camera origin) to
/// rectified pixels and `q` maps `(u, v, disparity, 1)` to homogeneous 3D.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoRectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    pub q: Matrix4<f64>,
    pub image_size: ImageSize,
    pub geometry: RectifiedGeometry,
}

impl StereoRectification {
    /// Left 3×3 block of `p1`.
    pub fn left_camera(&self) -> Matrix3<f64> {
        self.p1.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Left 3×3 block of `p2`.
    pub fn right_camera(&self) -> Matrix3<f64> {
        self.p2.fixed_view::<3, 3>(0, 0).into_owned()
    }
}

/// Undistort a pixel of `camera`, rotate the ray by `rotation` and project
/// it with `new_k`. Rays that end up behind the camera have no image.
pub fn rectify_point(
    camera: &CameraIntrinsics,
    rotation: &Matrix3<f64>,
    new_k: &Matrix3<f64>,
    pixel: Point2<f64>,
) -> Option<Point2<f64>> {
    let n = camera.normalize(pixel);
    let ray = rotation * Vector3::new(n.x, n.y, 1.0);
    if ray.z <= f64::EPSILON {
        return None;
    }
    let p = new_k * (ray / ray.z);
    Some(Point2::new(p.x, p.y))
}

#[derive(Clone, Copy, Debug)]
struct Bounds {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

/// Largest rectangle fully inside, and smallest rectangle fully containing,
/// the rectified image of the source frame.
fn rectified_bounds(
    camera: &CameraIntrinsics,
    rotation: &Matrix3<f64>,
    new_k: &Matrix3<f64>,
    size: ImageSize,
) -> Option<(Bounds, Bounds)> {
    let (w, h) = (size.width as f64, size.height as f64);
    let last = (BOUNDS_GRID - 1) as f64;
    let mut inner = Bounds {
        x0: f64::NEG_INFINITY,
        y0: f64::NEG_INFINITY,
        x1: f64::INFINITY,
        y1: f64::INFINITY,
    };
    let mut outer = Bounds {
        x0: f64::INFINITY,
        y0: f64::INFINITY,
        x1: f64::NEG_INFINITY,
        y1: f64::NEG_INFINITY,
    };

    for gy in 0..BOUNDS_GRID {
        for gx in 0..BOUNDS_GRID {
            let src = Point2::new(gx as f64 * w / last, gy as f64 * h / last);
            let p = rectify_point(camera, rotation, new_k, src)?;
            outer.x0 = outer.x0.min(p.x);
            outer.x1 = outer.x1.max(p.x);
            outer.y0 = outer.y0.min(p.y);
            outer.y1 = outer.y1.max(p.y);
            if gx == 0 {
                inner.x0 = inner.x0.max(p.x);
            }
            if gx == BOUNDS_GRID - 1 {
                inner.x1 = inner.x1.min(p.x);
            }
            if gy == 0 {
                inner.y0 = inner.y0.max(p.y);
            }
            if gy == BOUNDS_GRID - 1 {
                inner.y1 = inner.y1.min(p.y);
            }
        }
    }
    Some((inner, outer))
}

/// Ratios of "principal point to image edge" over "principal point to
/// rectangle edge" for the four sides.
fn edge_ratios(c: Vector2<f64>, r: &Bounds, size: ImageSize) -> [f64; 4] {
    let (w, h) = (size.width as f64, size.height as f64);
    [
        c.x / (c.x - r.x0),
        c.y / (c.y - r.y0),
        (w - c.x) / (r.x1 - c.x),
        (h - c.y) / (r.y1 - c.y),
    ]
}

/// Focal scale for free-scaling parameter `alpha`.
fn alpha_scale(
    alpha: f64,
    cams: [(&CameraIntrinsics, &Matrix3<f64>); 2],
    cc: &[Vector2<f64>; 2],
    focal: f64,
    size: ImageSize,
) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut s0 = f64::NEG_INFINITY;
    let mut s1 = f64::INFINITY;
    for (k, (cam, rot)) in cams.into_iter().enumerate() {
        let new_k = Matrix3::new(focal, 0.0, cc[k].x, 0.0, focal, cc[k].y, 0.0, 0.0, 1.0);
        let Some((inner, outer)) = rectified_bounds(cam, rot, &new_k, size) else {
            warn!("rectified image bounds are not finite; leaving the focal length unscaled");
            return 1.0;
        };
        for r in edge_ratios(cc[k], &inner, size) {
            if r.is_finite() && r > 0.0 {
                s0 = s0.max(r);
            }
        }
        for r in edge_ratios(cc[k], &outer, size) {
            if r.is_finite() && r > 0.0 {
                s1 = s1.min(r);
            }
        }
    }
    if !s0.is_finite() || !s1.is_finite() {
        return 1.0;
    }
    s0 * (1.0 - alpha) + s1 * alpha
}

fn check_camera(cam: &CameraIntrinsics) -> Result<(), RectifyError> {
    let ok = cam.fx() > 0.0
        && cam.fy() > 0.0
        && cam.k.iter().all(|v| v.is_finite())
        && cam.k.try_inverse().is_some();
    if ok {
        Ok(())
    } else {
        Err(RectifyError::SingularIntrinsics)
    }
}

/// Compute rectifying rotations and projections for images of `size`.
pub fn stereo_rectify(
    calib: &CalibrationResult,
    size: ImageSize,
    params: &RectifyParams,
) -> Result<StereoRectification, RectifyError> {
    if size.is_empty() {
        return Err(RectifyError::EmptyImage(size));
    }
    let (left, right) = (&calib.left, &calib.right);
    check_camera(left)?;
    check_camera(right)?;

    let ext = &calib.extrinsics;
    let baseline = ext.baseline();
    if baseline.is_nan() || baseline <= 1e-12 {
        return Err(RectifyError::DegenerateBaseline);
    }

    // Split the relative rotation in half between the cameras.
    let om = matrix_to_rodrigues(&ext.rotation);
    let half = rodrigues_to_matrix(&(om * -0.5));
    let t = half * ext.translation;

    // Then rotate the baseline onto the x (or y) axis.
    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let mut axis = Vector3::zeros();
    axis[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t.cross(&axis);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / t.norm()).clamp(-1.0, 1.0).acos() / nw;
    }
    let align = rodrigues_to_matrix(&ww);
    let r1 = align * half.transpose();
    let r2 = align * half;
    let t_rect = r2 * ext.translation;

    let (nx, ny) = (size.width as f64, size.height as f64);
    let mut focal = f64::INFINITY;
    for cam in [left, right] {
        let mut f = if idx == 0 { cam.fy() } else { cam.fx() };
        let k1 = cam.distortion.k1;
        if k1 < 0.0 {
            f *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * f * f);
        }
        focal = focal.min(f);
    }
    if !(focal.is_finite() && focal > 0.0) {
        return Err(RectifyError::SingularIntrinsics);
    }

    // Principal points centre the rectified image corners.
    let focal_only = Matrix3::new(focal, 0.0, 0.0, 0.0, focal, 0.0, 0.0, 0.0, 1.0);
    let corners = [
        Point2::new(0.0, 0.0),
        Point2::new(nx - 1.0, 0.0),
        Point2::new(0.0, ny - 1.0),
        Point2::new(nx - 1.0, ny - 1.0),
    ];
    let centre = Vector2::new((nx - 1.0) * 0.5, (ny - 1.0) * 0.5);
    let mut cc = [Vector2::zeros(); 2];
    for (k, (cam, rot)) in [(left, &r1), (right, &r2)].into_iter().enumerate() {
        let projected: Vec<Vector2<f64>> = corners
            .iter()
            .filter_map(|&p| rectify_point(cam, rot, &focal_only, p))
            .map(|p| p.coords)
            .collect();
        if projected.is_empty() {
            return Err(RectifyError::SingularIntrinsics);
        }
        let mean = projected.iter().sum::<Vector2<f64>>() / projected.len() as f64;
        cc[k] = centre - mean;
    }
    if params.zero_disparity {
        let mean = (cc[0] + cc[1]) * 0.5;
        cc = [mean, mean];
    } else if idx == 0 {
        let y = (cc[0].y + cc[1].y) * 0.5;
        cc[0].y = y;
        cc[1].y = y;
    }

    if let Some(alpha) = params.alpha {
        let s = alpha_scale(alpha, [(left, &r1), (right, &r2)], &cc, focal, size);
        debug!("rectification alpha {alpha}: focal scale {s:.4}");
        focal *= s;
    }

    let p1 = Matrix3x4::new(
        focal, 0.0, cc[0].x, 0.0, //
        0.0, focal, cc[0].y, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let mut p2 = Matrix3x4::new(
        focal, 0.0, cc[1].x, 0.0, //
        0.0, focal, cc[1].y, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let tx = t_rect[idx];
    p2[(idx, 3)] = tx * focal;

    let offset = if idx == 0 {
        cc[0].x - cc[1].x
    } else {
        cc[0].y - cc[1].y
    };
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -cc[0].x, //
        0.0, 1.0, 0.0, -cc[0].y, //
        0.0, 0.0, 0.0, focal, //
        0.0, 0.0, -1.0 / tx, offset / tx,
    );

    if idx != 0 {
        warn!("baseline is mostly vertical; rectified columns, not rows, are epipolar lines");
    }

    Ok(StereoRectification {
        r1,
        r2,
        p1,
        p2,
        q,
        image_size: size,
        geometry: RectifiedGeometry {
            focal,
            cx: cc[0].x,
            cy: cc[0].y,
            baseline,
            disparity_offset: cc[1].x - cc[0].x,
        },
    })
}
