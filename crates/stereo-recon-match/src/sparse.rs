use crate::disparity::{DisparitySource, PixelDisparity, StereoMatcher};
use crate::error::MatchError;
use crate::orb::{hamming_distance, Descriptor, Features, OrbExtractor};
use crate::params::SparseMatchParams;
use log::debug;
use nalgebra::Point2;
use rayon::prelude::*;
use stereo_recon_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One left keypoint paired with its nearest right descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SparseMatch {
    pub left: Point2<f32>,
    pub right: Point2<f32>,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

impl SparseMatch {
    pub fn disparity(&self) -> f32 {
        self.left.x - self.right.x
    }

    pub fn vertical_offset(&self) -> f32 {
        (self.left.y - self.right.y).abs()
    }
}

/// Matches split by the scanline test.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseCorrespondences {
    /// Matches on (nearly) the same row, in left keypoint order.
    pub kept: Vec<SparseMatch>,
    /// Matches rejected for their vertical offset.
    pub discarded: Vec<SparseMatch>,
}

impl SparseCorrespondences {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

impl DisparitySource for SparseCorrespondences {
    /// Kept matches in order.
    fn disparities(&self) -> impl Iterator<Item = PixelDisparity> + '_ {
        self.kept.iter().map(|m| PixelDisparity {
            u: m.left.x,
            v: m.left.y,
            disparity: m.disparity(),
        })
    }
}

/// Keep matches whose rows differ by less than `tolerance`. Order is
/// preserved in both halves.
pub fn partition_by_vertical_offset(
    matches: impl IntoIterator<Item = SparseMatch>,
    tolerance: f32,
) -> SparseCorrespondences {
    let (kept, discarded) = matches
        .into_iter()
        .partition(|m| m.vertical_offset() < tolerance);
    SparseCorrespondences { kept, discarded }
}

/// Nearest right descriptor for every left descriptor, as
/// `(left, right, distance)`. The first right index wins ties.
pub fn match_descriptors(left: &[Descriptor], right: &[Descriptor]) -> Vec<(usize, usize, u32)> {
    if right.is_empty() {
        return Vec::new();
    }
    left.par_iter()
        .enumerate()
        .filter_map(|(i, l)| nearest(l, right).map(|(j, d)| (i, j, d)))
        .collect()
}

fn nearest(query: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .enumerate()
        .map(|(j, c)| (j, hamming_distance(query, c)))
        .fold(None, |best, (j, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((j, d)),
        })
}

/// Binary-descriptor matcher for rectified pairs.
#[derive(Clone, Debug, Default)]
pub struct SparseMatcher {
    params: SparseMatchParams,
    extractor: OrbExtractor,
}

impl SparseMatcher {
    pub fn new(params: SparseMatchParams) -> Result<Self, MatchError> {
        params.validate()?;
        Ok(Self {
            extractor: OrbExtractor::new(params.features.clone()),
            params,
        })
    }

    pub fn params(&self) -> &SparseMatchParams {
        &self.params
    }

    /// Detect features in both views, match left to right and split the
    /// matches by vertical offset.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, left, right), fields(w = left.width, h = left.height))
    )]
    pub fn compute(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<SparseCorrespondences, MatchError> {
        if left.size() != right.size() {
            return Err(MatchError::SizeMismatch {
                left: left.size(),
                right: right.size(),
            });
        }
        let (fl, fr) = rayon::join(
            || self.extractor.extract(left),
            || self.extractor.extract(right),
        );
        let matches = self.match_features(&fl, &fr);
        let result = partition_by_vertical_offset(matches, self.params.vertical_tolerance);
        debug!(
            "sparse matching: {} / {} keypoints, {} kept, {} discarded",
            fl.len(),
            fr.len(),
            result.kept.len(),
            result.discarded.len()
        );
        Ok(result)
    }

    /// Nearest-neighbour matches of `left` in `right`, filtered by the
    /// distance cap and the optional mutual check.
    pub fn match_features(&self, left: &Features, right: &Features) -> Vec<SparseMatch> {
        let forward = match_descriptors(&left.descriptors, &right.descriptors);
        let backward = if self.params.cross_check {
            match_descriptors(&right.descriptors, &left.descriptors)
        } else {
            Vec::new()
        };
        forward
            .into_iter()
            .filter(|&(_, _, d)| self.params.max_distance.is_none_or(|max| d <= max))
            .filter(|&(i, j, _)| {
                !self.params.cross_check || backward.get(j).is_some_and(|b| b.1 == i)
            })
            .map(|(i, j, distance)| {
                let (l, r) = (&left.keypoints[i], &right.keypoints[j]);
                SparseMatch {
                    left: Point2::new(l.x, l.y),
                    right: Point2::new(r.x, r.y),
                    distance,
                }
            })
            .collect()
    }
}

impl StereoMatcher for SparseMatcher {
    type Output = SparseCorrespondences;

    fn match_views(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<SparseCorrespondences, MatchError> {
        self.compute(left, right)
    }
}
