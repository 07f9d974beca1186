//! Pinhole camera with five-term Brown-Conrady distortion.
//!
//! Coefficient order follows the usual `[k1, k2, p1, p2, k3]` convention so
//! that stored calibrations stay interchangeable with other tools.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERATIONS: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Build from a `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]` slice.
    pub fn from_slice(coeffs: &[f64]) -> Option<Self> {
        match *coeffs {
            [k1, k2, p1, p2] => Some(Self {
                k1,
                k2,
                p1,
                p2,
                k3: 0.0,
            }),
            [k1, k2, p1, p2, k3] => Some(Self { k1, k2, p1, p2, k3 }),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to a normalized image point.
    #[inline]
    pub fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (x0, y0) = (p.x, p.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if radial <= 0.0 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (x0 - dx) / radial;
            y = (y0 - dy) / radial;
        }
        Vector2::new(x, y)
    }
}

/// Calibration matrix plus distortion for one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub k: Matrix3<f64>,
    pub distortion: Distortion,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, distortion: Distortion) -> Self {
        Self {
            k: Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            distortion,
        }
    }

    pub fn fx(&self) -> f64 {
        self.k[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.k[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.k[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.k[(1, 2)]
    }

    pub fn skew(&self) -> f64 {
        self.k[(0, 1)]
    }

    /// Map a normalized (undistorted) point to pixels, applying distortion.
    #[inline]
    pub fn project_normalized(&self, p: Vector2<f64>) -> Point2<f64> {
        let d = self.distortion.distort(p);
        Point2::new(
            self.fx() * d.x + self.skew() * d.y + self.cx(),
            self.fy() * d.y + self.cy(),
        )
    }

    /// Project a point in this camera's frame. Points at or behind the
    /// camera centre have no projection.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(self.project_normalized(Vector2::new(p.x / p.z, p.y / p.z)))
    }

    /// Pixel to undistorted normalized coordinates.
    pub fn normalize(&self, pixel: Point2<f64>) -> Vector2<f64> {
        let yd = (pixel.y - self.cy()) / self.fy();
        let xd = (pixel.x - self.cx() - self.skew() * yd) / self.fx();
        self.distortion.undistort(Vector2::new(xd, yd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::new(
            800.0,
            790.0,
            320.0,
            240.0,
            Distortion {
                k1: -0.12,
                k2: 0.05,
                p1: 0.001,
                p2: -0.0008,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn normalize_inverts_projection() {
        let cam = camera();
        for p in [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.2, -0.1, 1.5),
            Point3::new(-0.3, 0.25, 1.2),
        ] {
            let pixel = cam.project(&p).expect("in front");
            let n = cam.normalize(pixel);
            assert_relative_eq!(n.x, p.x / p.z, epsilon = 1e-9);
            assert_relative_eq!(n.y, p.y / p.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        assert!(camera().project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn distortion_slices() {
        let d = Distortion::from_slice(&[0.1, 0.2, 0.3, 0.4]).expect("four terms");
        assert_eq!(d.to_array(), [0.1, 0.2, 0.3, 0.4, 0.0]);
        assert!(Distortion::from_slice(&[0.1, 0.2, 0.3]).is_none());
    }
}
