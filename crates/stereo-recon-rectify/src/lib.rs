//! Epipolar rectification for a calibrated two-camera rig.
//!
//! [`stereo_rectify`] splits the relative rotation evenly between both
//! cameras, then turns the baseline onto the image x axis so that conjugate
//! epipolar lines become the same scanline. [`RectificationEngine`] turns
//! the result into per-camera undistort+rectify lookup maps and applies
//! them to image pairs with bilinear interpolation.
//!
//! ```no_run
//! use stereo_recon_core::{CalibrationResult, ImagePair, ImageSize};
//! use stereo_recon_rectify::{RectificationEngine, RectifyParams};
//!
//! fn run(calib: &CalibrationResult, pair: &ImagePair) -> Result<ImagePair, stereo_recon_rectify::RectifyError> {
//!     let engine = RectificationEngine::new(calib, pair.size(), &RectifyParams::default())?;
//!     engine.apply(pair)
//! }
//! ```

mod engine;
mod error;
mod maps;
mod params;
mod rectify;

pub use engine::RectificationEngine;
pub use error::RectifyError;
pub use maps::RectificationMap;
pub use params::RectifyParams;
pub use rectify::{rectify_point, stereo_rectify, RectifiedGeometry, StereoRectification};
