//! JSON persistence of [`CalibrationResult`].
//!
//! Matrices are stored row-major as nested arrays. `T` is a 3×1 column.
//! Distortion vectors hold four or five coefficients.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use stereo_recon_core::{CalibrationResult, CameraIntrinsics, Distortion, ImageSize, StereoExtrinsics};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to write calibration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode calibration: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read calibration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("calibration is missing required key {key}")]
    MissingKey { key: &'static str },
    #[error("calibration key {key} has an invalid shape: {detail}")]
    BadShape { key: &'static str, detail: String },
}

type Mat3 = [[f64; 3]; 3];

/// On-disk layout. Every field is optional here so that a missing key is
/// reported by name rather than as a generic parse failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CalibrationDocument {
    #[serde(rename = "LEFT_K", skip_serializing_if = "Option::is_none")]
    pub left_k: Option<Mat3>,
    #[serde(rename = "LEFT_D", skip_serializing_if = "Option::is_none")]
    pub left_d: Option<Vec<f64>>,
    #[serde(rename = "RIGHT_K", skip_serializing_if = "Option::is_none")]
    pub right_k: Option<Mat3>,
    #[serde(rename = "RIGHT_D", skip_serializing_if = "Option::is_none")]
    pub right_d: Option<Vec<f64>>,
    #[serde(rename = "R", skip_serializing_if = "Option::is_none")]
    pub r: Option<Mat3>,
    #[serde(rename = "T", skip_serializing_if = "Option::is_none")]
    pub t: Option<[[f64; 1]; 3]>,
    #[serde(rename = "E", skip_serializing_if = "Option::is_none")]
    pub e: Option<Mat3>,
    #[serde(rename = "F", skip_serializing_if = "Option::is_none")]
    pub f: Option<Mat3>,
    /// `[width, height]` of one image half.
    #[serde(rename = "IMAGE_SIZE", skip_serializing_if = "Option::is_none")]
    pub image_size: Option<[usize; 2]>,
    #[serde(rename = "RMS", skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
}

fn to_rows(m: &Matrix3<f64>) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    out
}

fn from_rows(rows: &Mat3) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T, LoadError> {
    value.ok_or(LoadError::MissingKey { key })
}

fn distortion(coeffs: &[f64], key: &'static str) -> Result<Distortion, LoadError> {
    Distortion::from_slice(coeffs).ok_or_else(|| LoadError::BadShape {
        key,
        detail: format!("expected 4 or 5 coefficients, got {}", coeffs.len()),
    })
}

fn finite<'a>(values: impl IntoIterator<Item = &'a f64>, key: &'static str) -> Result<(), LoadError> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(LoadError::BadShape {
            key,
            detail: "non-finite entry".to_string(),
        })
    }
}

impl CalibrationDocument {
    pub fn from_result(result: &CalibrationResult) -> Self {
        let ext = &result.extrinsics;
        let t = ext.translation;
        Self {
            left_k: Some(to_rows(&result.left.k)),
            left_d: Some(result.left.distortion.to_array().to_vec()),
            right_k: Some(to_rows(&result.right.k)),
            right_d: Some(result.right.distortion.to_array().to_vec()),
            r: Some(to_rows(&ext.rotation)),
            t: Some([[t.x], [t.y], [t.z]]),
            e: Some(to_rows(&ext.essential)),
            f: Some(to_rows(&ext.fundamental)),
            image_size: result.image_size.map(|s| [s.width, s.height]),
            rms: result.rms,
        }
    }

    /// Validate and convert. `E` and `F` are re-derived from `R`, `T` and
    /// the intrinsics when absent.
    pub fn into_result(self) -> Result<CalibrationResult, LoadError> {
        let left_k = from_rows(&required(self.left_k, "LEFT_K")?);
        let left_d = required(self.left_d, "LEFT_D")?;
        let right_k = from_rows(&required(self.right_k, "RIGHT_K")?);
        let right_d = required(self.right_d, "RIGHT_D")?;
        let rotation = from_rows(&required(self.r, "R")?);
        let t = required(self.t, "T")?;
        let translation = Vector3::new(t[0][0], t[1][0], t[2][0]);

        finite(&left_k, "LEFT_K")?;
        finite(&left_d, "LEFT_D")?;
        finite(&right_k, "RIGHT_K")?;
        finite(&right_d, "RIGHT_D")?;
        finite(&rotation, "R")?;
        finite(&translation, "T")?;
        let left_d = distortion(&left_d, "LEFT_D")?;
        let right_d = distortion(&right_d, "RIGHT_D")?;

        let left = CameraIntrinsics {
            k: left_k,
            distortion: left_d,
        };
        let right = CameraIntrinsics {
            k: right_k,
            distortion: right_d,
        };

        let mut extrinsics = StereoExtrinsics::from_rt(rotation, translation, &left, &right)
            .ok_or(LoadError::BadShape {
                key: "LEFT_K",
                detail: "calibration matrix is singular".to_string(),
            })?;
        if let Some(e) = self.e {
            let e = from_rows(&e);
            finite(&e, "E")?;
            extrinsics.essential = e;
        }
        if let Some(f) = self.f {
            let f = from_rows(&f);
            finite(&f, "F")?;
            extrinsics.fundamental = f;
        }

        Ok(CalibrationResult {
            left,
            right,
            extrinsics,
            image_size: self.image_size.map(|[w, h]| ImageSize::new(w, h)),
            rms: self.rms,
        })
    }
}

pub fn calibration_to_json(result: &CalibrationResult) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(&CalibrationDocument::from_result(result))?)
}

/// Parse a calibration document held in memory. `Parse` errors report an
/// empty path.
pub fn calibration_from_json(text: &str) -> Result<CalibrationResult, LoadError> {
    let doc: CalibrationDocument = serde_json::from_str(text).map_err(|source| LoadError::Parse {
        path: PathBuf::new(),
        source,
    })?;
    doc.into_result()
}

pub fn save_calibration(path: impl AsRef<Path>, result: &CalibrationResult) -> Result<(), StoreError> {
    let path = path.as_ref();
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &CalibrationDocument::from_result(result))?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)
}

pub fn load_calibration(path: impl AsRef<Path>) -> Result<CalibrationResult, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: CalibrationDocument =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    doc.into_result()
}
