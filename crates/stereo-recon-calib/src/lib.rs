//! Stereo rig calibration and its persisted document.
//!
//! [`StereoCalibrator`] takes the corner sets of every pair in which both
//! halves saw the board, seeds each camera from planar homographies and then
//! refines both cameras, their distortion and the relative pose in a single
//! Levenberg-Marquardt solve. Per-view board poses are nuisance parameters.
//!
//! [`save_calibration`] and [`load_calibration`] persist the result as a
//! JSON key-value document (`LEFT_K`, `LEFT_D`, `RIGHT_K`, `RIGHT_D`, `R`,
//! `T` and optionally `E`, `F`, `IMAGE_SIZE`, `RMS`).

mod calibrator;
mod error;
mod init;
mod lm;
mod params;
mod store;

pub use calibrator::{StereoCalibration, StereoCalibrator, StereoView};
pub use error::CalibrationError;
pub use init::{initial_intrinsics, pose_from_homography};
pub use lm::{solve_lm, NllsProblem, SolveOptions, SolveReport};
pub use params::CalibrationParams;
pub use store::{
    calibration_from_json, calibration_to_json, load_calibration, save_calibration,
    CalibrationDocument, LoadError, StoreError,
};
