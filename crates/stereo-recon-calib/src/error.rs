use stereo_recon_core::ImageSize;

/// Fatal calibration failures. Missing detections never reach this type;
/// they are dropped before the solve.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("no valid calibration pairs (the pattern was found on both halves of zero images)")]
    NoValidPairs,

    #[error("invalid calibration image size {0}")]
    InvalidImageSize(ImageSize),

    #[error(
        "view {index} is inconsistent: {object} object points, {left} left corners, {right} right corners"
    )]
    InconsistentView {
        index: usize,
        object: usize,
        left: usize,
        right: usize,
    },

    #[error("degenerate calibration input: {0}")]
    Degenerate(String),
}
