//! Coarse X-junction candidates from the `chess-corners` ChESS detector.

use chess_corners::{find_chess_corners_u8, ChessConfig, CornerDescriptor, ThresholdMode};
use log::warn;
use nalgebra::Point2;
use stereo_recon_core::GrayImageView;

/// Coarse corner candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Axis through the two bright sectors, radians modulo π.
    pub orientation: f32,
    pub strength: f32,
}

/// ChESS settings used for calibration captures: a single scale, peaks above
/// a fifth of the strongest response, NMS radius 2.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.threshold_mode = ThresholdMode::Relative;
    cfg.threshold_value = 0.2;
    cfg.nms_radius = 2;
    cfg
}

/// The descriptor reports two grid axes with a dark sector between
/// `axes[0]` and `axes[1]`; the bright diagonal bisects the other pair.
fn bright_axis(c: &CornerDescriptor) -> f32 {
    let dark = 0.5 * (c.axes[0].angle + c.axes[1].angle);
    (dark + std::f32::consts::FRAC_PI_2).rem_euclid(std::f32::consts::PI)
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: bright_axis(c),
        strength: c.response,
    }
}

/// Corner candidates of `src`. A detector failure yields no candidates.
pub fn find_corners(src: &GrayImageView<'_>, cfg: &ChessConfig) -> Vec<Corner> {
    if src.width == 0 || src.height == 0 {
        return Vec::new();
    }
    match find_chess_corners_u8(src.data, src.width as u32, src.height as u32, cfg) {
        Ok(raw) => raw.iter().map(adapt_chess_corner).collect(),
        Err(err) => {
            warn!("ChESS detection failed: {err}");
            Vec::new()
        }
    }
}
