use serde::{Deserialize, Serialize};

/// Stop conditions and model switches of the joint stereo solve.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Solver patience; residual evaluations are capped at
    /// `max_iterations * (num_params + 1)`.
    pub max_iterations: usize,
    /// Relative step / cost-decrease threshold.
    pub epsilon: f64,
    /// Keep the sixth-order radial term at zero.
    pub fix_k3: bool,
    /// Keep both tangential terms at zero.
    pub zero_tangent: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            max_iterations: 60,
            epsilon: 1e-6,
            fix_k3: false,
            zero_tangent: false,
        }
    }
}
