//! Core types and utilities for stereo reconstruction.
//!
//! This crate is purely geometric. It holds the image buffers, the pinhole
//! camera model with Brown-Conrady distortion, the two-camera rig model and
//! the planar homography solver shared by the detector, calibrator and
//! rectifier crates. It does not decode images and does not depend on any
//! concrete detector.

mod camera;
mod homography;
mod image;
mod logger;
mod pattern;
mod stereo;

pub use camera::{CameraIntrinsics, Distortion};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView, ImageError, ImagePair, ImageSize};
pub use pattern::{CornerSet, Pattern};
pub use stereo::{
    cross_matrix, matrix_to_rodrigues, rodrigues_to_matrix, CalibrationResult, StereoExtrinsics,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, stage_label};
