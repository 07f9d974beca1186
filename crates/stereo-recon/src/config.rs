use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stereo_recon_calib::CalibrationParams;
use stereo_recon_chessboard::ChessboardParams;
use stereo_recon_cloud::{PointFormat, TriangulationParams};
use stereo_recon_core::Pattern;
use stereo_recon_match::{DenseMatchParams, SparseMatchParams};
use stereo_recon_rectify::RectifyParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Every tunable of the pipeline. Missing JSON fields keep their defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pattern: Pattern,
    pub chessboard: ChessboardParams,
    pub calibration: CalibrationParams,
    pub rectify: RectifyParams,
    pub dense: DenseMatchParams,
    pub sparse: SparseMatchParams,
    pub dense_triangulation: TriangulationParams,
    pub sparse_triangulation: TriangulationParams,
    pub point_format: PointFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pattern: Pattern::default(),
            chessboard: ChessboardParams::default(),
            calibration: CalibrationParams::default(),
            rectify: RectifyParams::default(),
            dense: DenseMatchParams::default(),
            sparse: SparseMatchParams::default(),
            dense_triangulation: TriangulationParams::default(),
            sparse_triangulation: TriangulationParams::sparse(),
            point_format: PointFormat::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json(
            r#"{ "pattern": { "cols": 9 }, "dense": { "num_disparities": 64 }, "point_format": "obj" }"#,
        )
        .expect("parse");
        assert_eq!(cfg.pattern.cols, 9);
        assert_eq!(cfg.pattern.rows, 5);
        assert_eq!(cfg.dense.num_disparities, 64);
        assert_eq!(cfg.dense.block_size, 25);
        assert_eq!(cfg.point_format, PointFormat::Obj);
        assert_eq!(cfg.dense_triangulation.min_disparity, 10.0);
        assert_eq!(cfg.sparse_triangulation.min_disparity, 0.0);
        assert_eq!(cfg.sparse.vertical_tolerance, 5.0);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut cfg = PipelineConfig::default();
        cfg.calibration.max_iterations = 25;
        cfg.sparse.cross_check = true;
        cfg.write_json(&path).expect("write");

        let back = PipelineConfig::load_json(&path).expect("load");
        assert_eq!(back.calibration.max_iterations, 25);
        assert!(back.sparse.cross_check);
        assert_eq!(back.dense, cfg.dense);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = PipelineConfig::load_json("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("here.json")));
    }
}
