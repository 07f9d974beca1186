//! Metric 3D reconstruction from a fixed two-camera rig.
//!
//! Each capture is one side-by-side image holding the left and right views.
//! The pipeline runs in two independent phases:
//!
//! 1. **Calibration.** Detect a checkerboard on both halves of a batch of
//!    captures ([`pipeline::detect_views`]), solve the rig jointly
//!    ([`pipeline::calibrate_images`]) and persist the result with
//!    [`calib::save_calibration`].
//! 2. **Reconstruction.** Load the calibration, rectify a new capture, find
//!    correspondences densely ([`pipeline::reconstruct_dense`]) or sparsely
//!    ([`pipeline::reconstruct_sparse`]) and write the triangulated points
//!    with [`cloud::write_points`].
//!
//! All tunables live in [`PipelineConfig`], which loads from JSON.
//!
//! ```no_run
//! use stereo_recon::{io, pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let calib = stereo_recon::calib::load_calibration("calibration.json")?;
//! let capture = io::load_gray("scene.png")?;
//! let dense = pipeline::reconstruct_dense(&capture, &calib, &config)?;
//! stereo_recon::cloud::write_points("scene.txt", dense.points, config.point_format)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `stereo_recon::core`: images, camera model, rig model.
//! - `stereo_recon::chessboard`: checkerboard corner detection.
//! - `stereo_recon::calib`: stereo calibration and its JSON document.
//! - `stereo_recon::rectify`: rectifying rotations and remap tables.
//! - `stereo_recon::matching`: dense block matching and sparse keypoint matching.
//! - `stereo_recon::cloud`: triangulation and point cloud files.
//! - `stereo_recon::io` (feature `image`): image decoding and discovery.

pub use stereo_recon_calib as calib;
pub use stereo_recon_chessboard as chessboard;
pub use stereo_recon_cloud as cloud;
pub use stereo_recon_core as core;
pub use stereo_recon_match as matching;
pub use stereo_recon_rectify as rectify;

pub use stereo_recon_calib::{CalibrationError, StereoCalibration};
pub use stereo_recon_core::{CalibrationResult, GrayImage, ImagePair, ImageSize, Pattern};

mod config;
mod error;
pub mod pipeline;

#[cfg(feature = "image")]
pub mod io;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
