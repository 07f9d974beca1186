use crate::corners::default_chess_config;
use chess_corners::ChessConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 6.0,
            max_spacing_pix: 250.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Sub-pixel refinement stop conditions.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half side of the search window (11 gives a 23×23 window).
    pub half_window: usize,
    pub max_iterations: usize,
    /// Stop once a corner moves less than this many pixels.
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iterations: 60,
            epsilon: 1e-6,
        }
    }
}

/// Parameters of the checkerboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// ChESS corner candidate settings.
    pub chess: ChessConfig,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
    /// Largest tolerated deviation of a corner from the homography fitted to
    /// the whole grid, as a fraction of the mean corner spacing.
    pub max_grid_residual_rel: f32,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            chess: default_chess_config(),
            graph: GridGraphParams::default(),
            subpix: SubPixParams::default(),
            max_grid_residual_rel: 0.35,
        }
    }
}

impl ChessboardParams {
    pub fn with_subpix(mut self, subpix: SubPixParams) -> Self {
        self.subpix = subpix;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_corners::ThresholdMode;

    #[test]
    fn empty_json_takes_defaults() {
        let params: ChessboardParams = serde_json::from_str("{}").expect("params");
        assert_eq!(params.chess.threshold_mode, ThresholdMode::Relative);
        assert_eq!(params.chess.nms_radius, 2);
        assert_eq!(params.subpix.half_window, 11);
    }

    #[test]
    fn chess_settings_can_be_overridden() {
        let params: ChessboardParams =
            serde_json::from_str(r#"{"chess": {"threshold_value": 0.35}}"#).expect("params");
        assert!((params.chess.threshold_value - 0.35).abs() < 1e-6);
        assert_eq!(params.graph.k_neighbors, 8);
    }
}
