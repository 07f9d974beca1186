//! Correspondences between the two views of a rectified stereo pair.
//!
//! Two interchangeable strategies implement [`StereoMatcher`]:
//!
//! - [`DenseMatcher`] searches every left pixel along its scanline with a
//!   sum-of-absolute-differences block cost, then rejects textureless,
//!   ambiguous and speckled matches. The result is a [`DisparityMap`].
//! - [`SparseMatcher`] detects oriented FAST keypoints with rotated BRIEF
//!   descriptors in both views, matches them by Hamming distance and keeps
//!   only matches that lie on the same scanline. The result is a
//!   [`SparseCorrespondences`] holding both the kept and discarded matches.
//!
//! Both outputs implement [`DisparitySource`], which is what triangulation
//! consumes. An empty result is not an error.
//!
//! ```no_run
//! use stereo_recon_core::ImagePair;
//! use stereo_recon_match::{DenseMatchParams, DenseMatcher, MatchError, StereoMatcher};
//!
//! fn run(pair: &ImagePair) -> Result<usize, MatchError> {
//!     let matcher = DenseMatcher::new(DenseMatchParams::default())?;
//!     Ok(matcher.match_pair(pair)?.valid_count())
//! }
//! ```

mod dense;
mod disparity;
mod error;
mod orb;
mod params;
mod prefilter;
mod sparse;
mod speckle;

pub use dense::DenseMatcher;
pub use disparity::{DisparityMap, DisparitySource, PixelDisparity, StereoMatcher};
pub use error::MatchError;
pub use orb::{hamming_distance, Descriptor, Features, Keypoint, OrbExtractor};
pub use params::{DenseMatchParams, OrbParams, Prefilter, SparseMatchParams};
pub use sparse::{
    match_descriptors, partition_by_vertical_offset, SparseCorrespondences, SparseMatch,
    SparseMatcher,
};
pub use speckle::filter_speckles;
