use crate::error::MatchError;
use serde::{Deserialize, Serialize};

/// Normalisation applied to both images before block costs are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prefilter {
    /// Raw intensities.
    None,
    /// Horizontal Sobel response clamped to `[-cap, cap]`.
    #[default]
    XSobel,
    /// Intensity minus the local mean, clamped to `[-cap, cap]`.
    NormalizedResponse,
}

/// Block matching settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DenseMatchParams {
    /// Smallest disparity searched.
    pub min_disparity: usize,
    /// Number of disparities searched, starting at `min_disparity`.
    pub num_disparities: usize,
    /// Odd side length of the square matching block.
    pub block_size: usize,
    pub prefilter: Prefilter,
    /// Odd window size of the local mean for [`Prefilter::NormalizedResponse`].
    pub prefilter_size: usize,
    /// Clamp of the prefiltered response, in `1..=127`.
    pub prefilter_cap: u8,
    /// Minimum summed gradient inside the left block; flatter blocks get no match.
    pub texture_threshold: u32,
    /// Percent margin by which the best cost must beat every non-adjacent
    /// candidate. Zero disables the check.
    pub uniqueness_ratio: u32,
    /// Connected regions of at most this many pixels are removed. Zero
    /// disables the speckle filter.
    pub speckle_window_size: usize,
    /// Largest disparity step between neighbours of one region, in pixels.
    pub speckle_range: f32,
    /// Maximum allowed difference between the left and the right-to-left
    /// disparity. `None` skips the check.
    pub disp12_max_diff: Option<f32>,
    /// Refine disparities to sub-pixel precision with a parabola fit.
    pub subpixel: bool,
}

impl Default for DenseMatchParams {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            num_disparities: 192,
            block_size: 25,
            prefilter: Prefilter::XSobel,
            prefilter_size: 9,
            prefilter_cap: 31,
            texture_threshold: 20,
            uniqueness_ratio: 15,
            speckle_window_size: 100,
            speckle_range: 2.0,
            disp12_max_diff: None,
            subpixel: true,
        }
    }
}

impl DenseMatchParams {
    /// Largest disparity the matcher can report.
    pub fn max_disparity(&self) -> usize {
        self.min_disparity + self.num_disparities.saturating_sub(1)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.num_disparities == 0 {
            return Err(MatchError::InvalidParams(
                "num_disparities must be positive".into(),
            ));
        }
        if self.block_size < 3 || self.block_size % 2 == 0 {
            return Err(MatchError::InvalidParams(format!(
                "block_size must be odd and at least 3, got {}",
                self.block_size
            )));
        }
        if self.prefilter == Prefilter::NormalizedResponse
            && (self.prefilter_size < 3 || self.prefilter_size % 2 == 0)
        {
            return Err(MatchError::InvalidParams(format!(
                "prefilter_size must be odd and at least 3, got {}",
                self.prefilter_size
            )));
        }
        if !(1..=127).contains(&self.prefilter_cap) {
            return Err(MatchError::InvalidParams(format!(
                "prefilter_cap must be in 1..=127, got {}",
                self.prefilter_cap
            )));
        }
        if self.uniqueness_ratio >= 100 {
            return Err(MatchError::InvalidParams(format!(
                "uniqueness_ratio must be below 100, got {}",
                self.uniqueness_ratio
            )));
        }
        if self.speckle_range.is_nan() || self.speckle_range < 0.0 {
            return Err(MatchError::InvalidParams(
                "speckle_range must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Oriented FAST keypoint and rotated BRIEF descriptor settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrbParams {
    /// Keypoint budget over all pyramid levels.
    pub max_features: usize,
    /// Downscale factor between pyramid levels.
    pub scale_factor: f32,
    pub levels: usize,
    /// FAST intensity threshold, in grey levels.
    pub fast_threshold: u8,
    /// Harris corner constant used to rank FAST corners.
    pub harris_k: f32,
    /// Keypoints closer than this to a level border are dropped.
    pub edge_threshold: usize,
    /// Gaussian blur applied before descriptor sampling.
    pub descriptor_sigma: f32,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            scale_factor: 1.2,
            levels: 8,
            fast_threshold: 20,
            harris_k: 0.04,
            edge_threshold: 19,
            descriptor_sigma: 2.0,
        }
    }
}

/// Sparse matching settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SparseMatchParams {
    pub features: OrbParams,
    /// Drop matches whose Hamming distance exceeds this. `None` keeps every
    /// nearest neighbour.
    pub max_distance: Option<u32>,
    /// Keep only mutual nearest neighbours.
    pub cross_check: bool,
    /// Matches whose rows differ by this many pixels or more are discarded.
    pub vertical_tolerance: f32,
}

impl Default for SparseMatchParams {
    fn default() -> Self {
        Self {
            features: OrbParams::default(),
            max_distance: None,
            cross_check: false,
            vertical_tolerance: 5.0,
        }
    }
}

impl SparseMatchParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        let f = &self.features;
        if f.levels == 0 {
            return Err(MatchError::InvalidParams("levels must be positive".into()));
        }
        if f.scale_factor.is_nan() || f.scale_factor <= 1.0 {
            return Err(MatchError::InvalidParams(format!(
                "scale_factor must exceed 1, got {}",
                f.scale_factor
            )));
        }
        if f.edge_threshold < crate::orb::PATCH_RADIUS {
            return Err(MatchError::InvalidParams(format!(
                "edge_threshold must be at least {}, got {}",
                crate::orb::PATCH_RADIUS,
                f.edge_threshold
            )));
        }
        if self.vertical_tolerance.is_nan() || self.vertical_tolerance <= 0.0 {
            return Err(MatchError::InvalidParams(
                "vertical_tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}
