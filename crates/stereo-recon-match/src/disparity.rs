use crate::error::MatchError;
use stereo_recon_core::{GrayImage, GrayImageView, ImagePair, ImageSize};

/// Horizontal shift of one left-rectified pixel or keypoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelDisparity {
    pub u: f32,
    pub v: f32,
    /// `u_left - u_right`.
    pub disparity: f32,
}

/// Anything that maps left-rectified positions to disparities.
pub trait DisparitySource {
    /// Every valid correspondence, in a stable order.
    fn disparities(&self) -> impl Iterator<Item = PixelDisparity> + '_;
}

/// A correspondence strategy over rectified image pairs.
pub trait StereoMatcher {
    type Output: DisparitySource;

    /// Match two rectified views of equal size.
    fn match_views(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<Self::Output, MatchError>;

    fn match_pair(&self, pair: &ImagePair) -> Result<Self::Output, MatchError> {
        self.match_views(&pair.left.view(), &pair.right.view())
    }
}

/// Dense per-pixel disparity of the left image. `None` marks "no match".
#[derive(Clone, Debug, PartialEq)]
pub struct DisparityMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<Option<f32>>,
}

impl DisparityMap {
    /// Map of the given size with no matches.
    pub fn invalid(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![None; width * height],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        self.data[y * self.width + x]
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| d.is_some()).count()
    }

    /// Smallest and largest valid disparity.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.data.iter().flatten().fold(None, |acc, &d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
    }

    /// Stretch valid disparities over `[0, 255]` for display. Pixels
    /// without a match are black.
    pub fn to_gray(&self) -> GrayImage {
        let mut out = GrayImage::new(self.width, self.height);
        let Some((lo, hi)) = self.range() else {
            return out;
        };
        let scale = if hi > lo { 255.0 / (hi - lo) } else { 0.0 };
        for (dst, d) in out.data.iter_mut().zip(&self.data) {
            if let Some(d) = d {
                *dst = ((d - lo) * scale).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

impl DisparitySource for DisparityMap {
    /// Valid pixels in row-major scan order.
    fn disparities(&self) -> impl Iterator<Item = PixelDisparity> + '_ {
        let w = self.width.max(1);
        self.data.iter().enumerate().filter_map(move |(i, d)| {
            d.map(|disparity| PixelDisparity {
                u: (i % w) as f32,
                v: (i / w) as f32,
                disparity,
            })
        })
    }
}
