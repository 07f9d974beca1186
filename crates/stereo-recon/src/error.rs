use crate::config::ConfigError;
use std::path::PathBuf;
use stereo_recon_calib::{CalibrationError, LoadError, StoreError};
use stereo_recon_cloud::{TriangulateError, WriteError};
use stereo_recon_core::ImageError;
use stereo_recon_match::MatchError;
use stereo_recon_rectify::RectifyError;

/// Errors of the end-to-end pipeline functions.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "image")]
    #[error("cannot decode or encode {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Rectify(#[from] RectifyError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Triangulate(#[from] TriangulateError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
