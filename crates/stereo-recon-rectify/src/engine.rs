use crate::error::RectifyError;
use crate::maps::RectificationMap;
use crate::params::RectifyParams;
use crate::rectify::{stereo_rectify, RectifiedGeometry, StereoRectification};
use log::debug;
use stereo_recon_core::{CalibrationResult, ImagePair, ImageSize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Rectification maps of both cameras for one image size.
#[derive(Clone, Debug)]
pub struct RectificationEngine {
    rectification: StereoRectification,
    left: RectificationMap,
    right: RectificationMap,
}

impl RectificationEngine {
    /// Derive maps for images of `size`.
    ///
    /// Fails with [`RectifyError::ShapeMismatch`] when the calibration
    /// records a different image size.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(calib, params), fields(size = %size))
    )]
    pub fn new(
        calib: &CalibrationResult,
        size: ImageSize,
        params: &RectifyParams,
    ) -> Result<Self, RectifyError> {
        if let Some(expected) = calib.image_size {
            if expected != size {
                return Err(RectifyError::ShapeMismatch {
                    expected,
                    actual: size,
                });
            }
        }

        let rectification = stereo_rectify(calib, size, params)?;
        let (left, right) = rayon::join(
            || RectificationMap::new(&calib.left, &rectification.r1, &rectification.left_camera(), size),
            || RectificationMap::new(&calib.right, &rectification.r2, &rectification.right_camera(), size),
        );
        let (Some(left), Some(right)) = (left, right) else {
            return Err(RectifyError::SingularIntrinsics);
        };

        let g = &rectification.geometry;
        debug!(
            "rectified {}: f {:.2}px, c ({:.2}, {:.2}), baseline {:.4}",
            size, g.focal, g.cx, g.cy, g.baseline
        );
        Ok(Self {
            rectification,
            left,
            right,
        })
    }

    pub fn size(&self) -> ImageSize {
        self.rectification.image_size
    }

    pub fn rectification(&self) -> &StereoRectification {
        &self.rectification
    }

    pub fn geometry(&self) -> RectifiedGeometry {
        self.rectification.geometry
    }

    pub fn left_map(&self) -> &RectificationMap {
        &self.left
    }

    pub fn right_map(&self) -> &RectificationMap {
        &self.right
    }

    /// Remap both halves of `pair`. The pair must have the engine's size.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn apply(&self, pair: &ImagePair) -> Result<ImagePair, RectifyError> {
        let actual = pair.size();
        if actual != self.size() {
            return Err(RectifyError::ShapeMismatch {
                expected: self.size(),
                actual,
            });
        }
        let (left, right) = rayon::join(
            || self.left.remap(&pair.left.view()),
            || self.right.remap(&pair.right.view()),
        );
        Ok(ImagePair { left, right })
    }
}
