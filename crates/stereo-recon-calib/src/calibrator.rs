use crate::error::CalibrationError;
use crate::init::{initial_intrinsics, median_vector, pose_from_homography};
use crate::lm::{solve_lm, NllsProblem, SolveOptions, SolveReport};
use crate::params::CalibrationParams;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Point2, Point3, Rotation3, Vector3};
use rayon::prelude::*;
use stereo_recon_core::{
    estimate_homography, matrix_to_rodrigues, rodrigues_to_matrix, CalibrationResult,
    CameraIntrinsics, CornerSet, Distortion, Homography, ImageSize, Pattern, StereoExtrinsics,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One calibration pair: the board corners seen by both cameras, index
/// aligned with the board's planar object points.
#[derive(Clone, Debug)]
pub struct StereoView {
    pub object_points: Vec<Point3<f64>>,
    pub left: CornerSet,
    pub right: CornerSet,
}

impl StereoView {
    pub fn new(pattern: &Pattern, left: CornerSet, right: CornerSet) -> Self {
        Self {
            object_points: pattern.object_points(),
            left,
            right,
        }
    }
}

/// Calibration plus solver diagnostics.
#[derive(Clone, Debug)]
pub struct StereoCalibration {
    pub result: CalibrationResult,
    pub report: SolveReport,
    /// RMS reprojection error of each input view over both cameras.
    pub per_view_rms: Vec<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct StereoCalibrator {
    pub params: CalibrationParams,
}

// Parameter vector layout:
// [left fx fy cx cy k1 k2 p1 p2 k3 | right ... | rvec(3) T(3) | per-view rvec(3) t(3) ...]
const CAMERA_LEN: usize = 9;
const LEFT: usize = 0;
const RIGHT: usize = CAMERA_LEN;
const REL_ROT: usize = 2 * CAMERA_LEN;
const REL_T: usize = REL_ROT + 3;
const SHARED_LEN: usize = REL_T + 3;
const POSE_LEN: usize = 6;

const BEHIND_CAMERA_RESIDUAL: f64 = 1e6;
// Boards whose normals are all within this angle are treated as one orientation.
const MIN_NORMAL_SPREAD_DEG: f64 = 5.0;

fn vec3(x: &DVector<f64>, at: usize) -> Vector3<f64> {
    Vector3::new(x[at], x[at + 1], x[at + 2])
}

fn put_vec3(x: &mut DVector<f64>, at: usize, v: &Vector3<f64>) {
    x[at] = v.x;
    x[at + 1] = v.y;
    x[at + 2] = v.z;
}

fn camera_at(x: &DVector<f64>, at: usize) -> CameraIntrinsics {
    CameraIntrinsics::new(
        x[at],
        x[at + 1],
        x[at + 2],
        x[at + 3],
        Distortion {
            k1: x[at + 4],
            k2: x[at + 5],
            p1: x[at + 6],
            p2: x[at + 7],
            k3: x[at + 8],
        },
    )
}

fn put_camera(x: &mut DVector<f64>, at: usize, cam: &CameraIntrinsics) {
    let d = cam.distortion.to_array();
    let values = [cam.fx(), cam.fy(), cam.cx(), cam.cy(), d[0], d[1], d[2], d[3], d[4]];
    for (i, v) in values.into_iter().enumerate() {
        x[at + i] = v;
    }
}

fn pose_offset(view: usize) -> usize {
    SHARED_LEN + view * POSE_LEN
}

/// Joint reprojection error of both cameras over all views.
struct RigProblem<'a> {
    views: &'a [StereoView],
    /// Start row of each view; four residuals per board point.
    row_offsets: Vec<usize>,
    num_rows: usize,
    fixed: Vec<bool>,
}

impl<'a> RigProblem<'a> {
    fn new(views: &'a [StereoView], params: &CalibrationParams) -> Self {
        let mut row_offsets = Vec::with_capacity(views.len());
        let mut num_rows = 0;
        for view in views {
            row_offsets.push(num_rows);
            num_rows += 4 * view.object_points.len();
        }

        let mut fixed = vec![false; SHARED_LEN + views.len() * POSE_LEN];
        for cam in [LEFT, RIGHT] {
            if params.zero_tangent {
                fixed[cam + 6] = true;
                fixed[cam + 7] = true;
            }
            if params.fix_k3 {
                fixed[cam + 8] = true;
            }
        }

        Self {
            views,
            row_offsets,
            num_rows,
            fixed,
        }
    }

    fn view_residuals(&self, x: &DVector<f64>, index: usize, out: &mut [f64]) {
        let view = &self.views[index];
        let left = camera_at(x, LEFT);
        let right = camera_at(x, RIGHT);
        let rel_r = rodrigues_to_matrix(&vec3(x, REL_ROT));
        let rel_t = vec3(x, REL_T);
        let at = pose_offset(index);
        let r = rodrigues_to_matrix(&vec3(x, at));
        let t = vec3(x, at + 3);

        for (k, p) in view.object_points.iter().enumerate() {
            let pl = r * p.coords + t;
            let pr = rel_r * pl + rel_t;
            let o = &mut out[4 * k..4 * k + 4];
            match left.project(&Point3::from(pl)) {
                Some(q) => {
                    o[0] = q.x - view.left.points[k].x;
                    o[1] = q.y - view.left.points[k].y;
                }
                None => {
                    o[0] = BEHIND_CAMERA_RESIDUAL;
                    o[1] = BEHIND_CAMERA_RESIDUAL;
                }
            }
            match right.project(&Point3::from(pr)) {
                Some(q) => {
                    o[2] = q.x - view.right.points[k].x;
                    o[3] = q.y - view.right.points[k].y;
                }
                None => {
                    o[2] = BEHIND_CAMERA_RESIDUAL;
                    o[3] = BEHIND_CAMERA_RESIDUAL;
                }
            }
        }
    }

    fn view_rows(&self, index: usize) -> usize {
        4 * self.views[index].object_points.len()
    }

    fn per_view_rms(&self, x: &DVector<f64>) -> Vec<f64> {
        (0..self.views.len())
            .map(|v| {
                let mut out = vec![0.0; self.view_rows(v)];
                self.view_residuals(x, v, &mut out);
                let observations = (out.len() / 2).max(1);
                (out.iter().map(|r| r * r).sum::<f64>() / observations as f64).sqrt()
            })
            .collect()
    }
}

fn step(x: f64) -> f64 {
    1e-6 * (1.0 + x.abs())
}

impl NllsProblem for RigProblem<'_> {
    fn num_params(&self) -> usize {
        self.fixed.len()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_rows);
        let slice = r.as_mut_slice();
        for v in 0..self.views.len() {
            let start = self.row_offsets[v];
            self.view_residuals(x, v, &mut slice[start..start + self.view_rows(v)]);
        }
        r
    }

    /// Central differences. Shared columns touch every row; a pose column
    /// only touches the rows of its own view.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.num_rows, self.num_params());

        let shared: Vec<(usize, DVector<f64>)> = (0..SHARED_LEN)
            .into_par_iter()
            .filter(|&c| !self.fixed[c])
            .map(|c| {
                let h = step(x[c]);
                let mut xp = x.clone();
                xp[c] += h;
                let rp = self.residuals(&xp);
                xp[c] = x[c] - h;
                let rm = self.residuals(&xp);
                (c, (rp - rm) / (2.0 * h))
            })
            .collect();
        for (c, col) in shared {
            j.set_column(c, &col);
        }

        let poses: Vec<(usize, Vec<Vec<f64>>)> = (0..self.views.len())
            .into_par_iter()
            .map(|v| {
                let rows = self.view_rows(v);
                let mut xp = x.clone();
                let mut plus = vec![0.0; rows];
                let mut minus = vec![0.0; rows];
                let columns: Vec<Vec<f64>> = (0..POSE_LEN)
                    .map(|k| {
                        let c = pose_offset(v) + k;
                        let h = step(x[c]);
                        xp[c] = x[c] + h;
                        self.view_residuals(&xp, v, &mut plus);
                        xp[c] = x[c] - h;
                        self.view_residuals(&xp, v, &mut minus);
                        xp[c] = x[c];
                        plus.iter()
                            .zip(&minus)
                            .map(|(p, m)| (p - m) / (2.0 * h))
                            .collect::<Vec<f64>>()
                    })
                    .collect();
                (v, columns)
            })
            .collect();
        for (v, columns) in poses {
            let start = self.row_offsets[v];
            for (k, col) in columns.into_iter().enumerate() {
                let c = pose_offset(v) + k;
                for (i, value) in col.into_iter().enumerate() {
                    j[(start + i, c)] = value;
                }
            }
        }
        j
    }
}

fn planar_homography(
    index: usize,
    side: &str,
    object: &[Point2<f64>],
    corners: &CornerSet,
) -> Result<Homography, CalibrationError> {
    estimate_homography(object, &corners.points).ok_or_else(|| {
        CalibrationError::Degenerate(format!("view {index}: no board homography for the {side} camera"))
    })
}

/// Warn when the board poses barely differ: focal length and distortion
/// are then poorly constrained.
fn warn_on_weak_geometry(left_poses: &[(Rotation3<f64>, Vector3<f64>)]) {
    if left_poses.len() < 3 {
        warn!(
            "only {} calibration view(s); at least 3 varied board poses are recommended",
            left_poses.len()
        );
    }
    let normals: Vec<Vector3<f64>> = left_poses.iter().map(|(r, _)| r * Vector3::z()).collect();
    let mut spread = 0.0f64;
    for (i, a) in normals.iter().enumerate() {
        for b in &normals[i + 1..] {
            spread = spread.max(a.dot(b).clamp(-1.0, 1.0).acos());
        }
    }
    if left_poses.len() > 1 && spread.to_degrees() < MIN_NORMAL_SPREAD_DEG {
        warn!(
            "board orientations span only {:.1} deg; tilt the board between captures",
            spread.to_degrees()
        );
    }
}

impl StereoCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        Self { params }
    }

    fn validate(views: &[StereoView], image_size: ImageSize) -> Result<(), CalibrationError> {
        if views.is_empty() {
            return Err(CalibrationError::NoValidPairs);
        }
        if image_size.is_empty() {
            return Err(CalibrationError::InvalidImageSize(image_size));
        }
        for (index, view) in views.iter().enumerate() {
            let object = view.object_points.len();
            let (left, right) = (view.left.len(), view.right.len());
            if object < 4 || object != left || object != right {
                return Err(CalibrationError::InconsistentView {
                    index,
                    object,
                    left,
                    right,
                });
            }
            if view.object_points.iter().any(|p| p.z.abs() > 1e-9) {
                return Err(CalibrationError::Degenerate(format!(
                    "view {index}: object points are not on the z = 0 plane"
                )));
            }
        }
        Ok(())
    }

    /// Closed-form initial guess for the full parameter vector.
    fn initial_guess(
        views: &[StereoView],
        image_size: ImageSize,
    ) -> Result<DVector<f64>, CalibrationError> {
        let mut left_h = Vec::with_capacity(views.len());
        let mut right_h = Vec::with_capacity(views.len());
        for (index, view) in views.iter().enumerate() {
            let object: Vec<Point2<f64>> = view.object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();
            left_h.push(planar_homography(index, "left", &object, &view.left)?);
            right_h.push(planar_homography(index, "right", &object, &view.right)?);
        }

        let left = initial_intrinsics(&left_h, image_size);
        let right = initial_intrinsics(&right_h, image_size);
        debug!(
            "initial focal lengths: left {:.1}/{:.1}, right {:.1}/{:.1}",
            left.fx(),
            left.fy(),
            right.fx(),
            right.fy()
        );

        let singular = |index: usize| {
            CalibrationError::Degenerate(format!("view {index}: board pose not recoverable"))
        };
        let mut left_poses = Vec::with_capacity(views.len());
        let mut rel_rotations = Vec::with_capacity(views.len());
        let mut rel_translations = Vec::with_capacity(views.len());
        for (index, (hl, hr)) in left_h.iter().zip(&right_h).enumerate() {
            let (rl, tl) = pose_from_homography(&left.k, hl).ok_or_else(|| singular(index))?;
            let (rr, tr) = pose_from_homography(&right.k, hr).ok_or_else(|| singular(index))?;
            let rel = rr * rl.inverse();
            rel_rotations.push(rel.scaled_axis());
            rel_translations.push(tr - rel * tl);
            left_poses.push((rl, tl));
        }
        warn_on_weak_geometry(&left_poses);

        let mut x = DVector::zeros(SHARED_LEN + views.len() * POSE_LEN);
        put_camera(&mut x, LEFT, &left);
        put_camera(&mut x, RIGHT, &right);
        put_vec3(&mut x, REL_ROT, &median_vector(&rel_rotations));
        put_vec3(&mut x, REL_T, &median_vector(&rel_translations));
        for (v, (r, t)) in left_poses.iter().enumerate() {
            put_vec3(&mut x, pose_offset(v), &matrix_to_rodrigues(r.matrix()));
            put_vec3(&mut x, pose_offset(v) + 3, t);
        }
        Ok(x)
    }

    /// Jointly calibrate both cameras and their relative pose.
    ///
    /// `image_size` is the size of one half. Views must hold the same number
    /// of object points and corners on both sides.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = views.len(), size = %image_size))
    )]
    pub fn calibrate(
        &self,
        views: &[StereoView],
        image_size: ImageSize,
    ) -> Result<StereoCalibration, CalibrationError> {
        Self::validate(views, image_size)?;
        let x0 = Self::initial_guess(views, image_size)?;

        let problem = RigProblem::new(views, &self.params);
        let options = SolveOptions {
            max_iterations: self.params.max_iterations,
            epsilon: self.params.epsilon,
        };
        let (x, report) = solve_lm(&problem, x0, &options);
        if x.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::Degenerate(
                "refinement produced non-finite parameters".to_string(),
            ));
        }

        info!(
            "stereo calibration over {} views: rms {:.4}px -> {:.4}px in {} evaluations",
            views.len(),
            report.initial_rms(),
            report.final_rms(),
            report.iterations
        );
        if !report.converged {
            warn!("stereo calibration did not converge: {}", report.termination);
        }

        let left = camera_at(&x, LEFT);
        let right = camera_at(&x, RIGHT);
        let extrinsics = StereoExtrinsics::from_rt(
            rodrigues_to_matrix(&vec3(&x, REL_ROT)),
            vec3(&x, REL_T),
            &left,
            &right,
        )
        .ok_or_else(|| CalibrationError::Degenerate("singular camera matrix after refinement".to_string()))?;

        let per_view_rms = problem.per_view_rms(&x);
        Ok(StereoCalibration {
            result: CalibrationResult {
                left,
                right,
                extrinsics,
                image_size: Some(image_size),
                rms: Some(report.final_rms()),
            },
            report,
            per_view_rms,
        })
    }
}
