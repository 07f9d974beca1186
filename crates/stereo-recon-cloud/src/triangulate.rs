use crate::error::TriangulateError;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use stereo_recon_match::{DisparitySource, PixelDisparity};
use stereo_recon_rectify::RectifiedGeometry;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TriangulationParams {
    /// Entries whose measured disparity is at or below this are skipped.
    pub min_disparity: f64,
}

impl Default for TriangulationParams {
    fn default() -> Self {
        Self { min_disparity: 10.0 }
    }
}

impl TriangulationParams {
    /// Keep every positive disparity.
    pub fn sparse() -> Self {
        Self { min_disparity: 0.0 }
    }
}

/// Back-projects left-rectified pixels with known disparity into the left
/// rectified camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangulator {
    focal: f64,
    cx: f64,
    cy: f64,
    baseline: f64,
    disparity_offset: f64,
    min_disparity: f64,
}

impl Triangulator {
    pub fn new(
        focal: f64,
        cx: f64,
        cy: f64,
        baseline: f64,
        params: &TriangulationParams,
    ) -> Result<Self, TriangulateError> {
        if !(focal.is_finite() && focal > 0.0) {
            return Err(TriangulateError::InvalidFocal(focal));
        }
        if !(baseline.is_finite() && baseline > 0.0) {
            return Err(TriangulateError::InvalidBaseline(baseline));
        }
        Ok(Self {
            focal,
            cx,
            cy,
            baseline,
            disparity_offset: 0.0,
            min_disparity: params.min_disparity,
        })
    }

    pub fn from_geometry(
        geometry: &RectifiedGeometry,
        params: &TriangulationParams,
    ) -> Result<Self, TriangulateError> {
        let mut t = Self::new(
            geometry.focal,
            geometry.cx,
            geometry.cy,
            geometry.baseline,
            params,
        )?;
        t.disparity_offset = geometry.disparity_offset;
        Ok(t)
    }

    pub fn min_disparity(&self) -> f64 {
        self.min_disparity
    }

    /// Point seen at `(u, v)` with disparity `d`, or `None` when `d` is at
    /// or below the minimum or the point would lie at or beyond infinity.
    pub fn point(&self, u: f64, v: f64, d: f64) -> Option<Point3<f64>> {
        if d.is_nan() || d <= self.min_disparity {
            return None;
        }
        let d = d + self.disparity_offset;
        if d <= 0.0 {
            return None;
        }
        let z = self.focal * self.baseline / d;
        let p = Point3::new((u - self.cx) * z / self.focal, (v - self.cy) * z / self.focal, z);
        p.coords.iter().all(|c| c.is_finite()).then_some(p)
    }

    /// Points of `entries` in input order, skipping rejected ones.
    pub fn triangulate<'a, I>(&'a self, entries: I) -> impl Iterator<Item = Point3<f64>> + 'a
    where
        I: IntoIterator<Item = PixelDisparity>,
        I::IntoIter: 'a,
    {
        entries.into_iter().filter_map(move |e| {
            self.point(f64::from(e.u), f64::from(e.v), f64::from(e.disparity))
        })
    }

    /// Points of every correspondence in `source`, in the source's order.
    pub fn points<'a, S: DisparitySource>(
        &'a self,
        source: &'a S,
    ) -> impl Iterator<Item = Point3<f64>> + 'a {
        self.triangulate(source.disparities())
    }
}
