use crate::{CameraIntrinsics, ImageSize};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rotation matrix from an axis-angle (Rodrigues) vector.
pub fn rodrigues_to_matrix(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*rvec).into_inner()
}

/// Axis-angle (Rodrigues) vector of a rotation matrix. The input is
/// re-orthonormalised first.
pub fn matrix_to_rodrigues(r: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix(r).scaled_axis()
}

/// Skew-symmetric matrix `[t]x` with `[t]x * v = t x v`.
pub fn cross_matrix(t: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
}

/// Pose of the right camera relative to the left: `X_r = R * X_l + T`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoExtrinsics {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
}

impl StereoExtrinsics {
    /// Build from `R`, `T`, deriving `E = [T]x R` and
    /// `F = K_r^-T E K_l^-1` (scaled so `F[2,2] = 1` when possible).
    ///
    /// Returns `None` when either calibration matrix is singular.
    pub fn from_rt(
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        left: &CameraIntrinsics,
        right: &CameraIntrinsics,
    ) -> Option<Self> {
        let essential = cross_matrix(&translation) * rotation;
        let kl_inv = left.k.try_inverse()?;
        let kr_inv = right.k.try_inverse()?;
        let mut fundamental = kr_inv.transpose() * essential * kl_inv;
        let scale = fundamental[(2, 2)];
        if scale.abs() > 1e-12 {
            fundamental /= scale;
        }
        Some(Self {
            rotation,
            translation,
            essential,
            fundamental,
        })
    }

    /// Distance between the two camera centres.
    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }
}

/// Immutable outcome of a stereo calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub extrinsics: StereoExtrinsics,
    /// Size of one image half the calibration was computed for.
    pub image_size: Option<ImageSize>,
    /// Final RMS reprojection error in pixels.
    pub rms: Option<f64>,
}
