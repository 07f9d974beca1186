use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RectifyParams {
    /// Give both rectified cameras the same principal point, so that points
    /// at infinity have zero disparity.
    pub zero_disparity: bool,
    /// Free scaling in `[0, 1]`: 0 keeps only valid pixels, 1 keeps every
    /// source pixel. `None` leaves the focal length unscaled.
    pub alpha: Option<f64>,
}

impl Default for RectifyParams {
    fn default() -> Self {
        Self {
            zero_disparity: true,
            alpha: Some(0.0),
        }
    }
}
