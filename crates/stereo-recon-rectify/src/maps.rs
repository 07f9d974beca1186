use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use stereo_recon_core::{sample_bilinear, CameraIntrinsics, GrayImage, GrayImageView, ImageSize};

/// Source pixel of every rectified pixel for one camera.
///
/// Only valid for the image size it was built for. Entries that have no
/// source hold `-1`, which samples as black.
#[derive(Clone, Debug, PartialEq)]
pub struct RectificationMap {
    pub size: ImageSize,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl RectificationMap {
    /// Build the map for `camera` rotated by `rotation` into a rectified
    /// camera with matrix `new_k`. `None` when `new_k * rotation` is
    /// singular.
    pub fn new(
        camera: &CameraIntrinsics,
        rotation: &Matrix3<f64>,
        new_k: &Matrix3<f64>,
        size: ImageSize,
    ) -> Option<Self> {
        let inv = (new_k * rotation).try_inverse()?;
        let w = size.width;
        let mut map_x = vec![-1.0f32; size.area()];
        let mut map_y = vec![-1.0f32; size.area()];
        if w == 0 {
            return Some(Self { size, map_x, map_y });
        }

        map_x
            .par_chunks_mut(w)
            .zip(map_y.par_chunks_mut(w))
            .enumerate()
            .for_each(|(v, (row_x, row_y))| {
                for u in 0..w {
                    let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                    if let Some(p) = camera.project(&Point3::from(ray)) {
                        row_x[u] = p.x as f32;
                        row_y[u] = p.y as f32;
                    }
                }
            });
        Some(Self { size, map_x, map_y })
    }

    #[inline]
    pub fn lookup(&self, x: usize, y: usize) -> (f32, f32) {
        let i = y * self.size.width + x;
        (self.map_x[i], self.map_y[i])
    }

    /// Resample `src` through the map with bilinear interpolation. The
    /// caller guarantees `src` has the map's size.
    pub fn remap(&self, src: &GrayImageView<'_>) -> GrayImage {
        let w = self.size.width;
        let mut data = vec![0u8; self.size.area()];
        if w > 0 {
            data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let (sx, sy) = self.lookup(x, y);
                    *out = sample_bilinear(src, sx, sy).round().clamp(0.0, 255.0) as u8;
                }
            });
        }
        GrayImage {
            width: self.size.width,
            height: self.size.height,
            data,
        }
    }
}
