use std::f32::consts::{FRAC_PI_2, PI};

/// Angle between two undirected axes (each defined modulo π), in `[0, π/2]`.
pub fn axis_diff(a: f32, b: f32) -> f32 {
    let d = (b - a).rem_euclid(PI);
    d.min(PI - d)
}

/// Whether two undirected axes are orthogonal within `tolerance` radians.
pub fn is_orthogonal(a: f32, b: f32, tolerance: f32) -> bool {
    (FRAC_PI_2 - axis_diff(a, b)).abs() <= tolerance.abs()
}

/// Angle between two directed vectors, in `[0, π]`.
pub fn vector_angle(a: nalgebra::Vector2<f32>, b: nalgebra::Vector2<f32>) -> f32 {
    let cross = a.x * b.y - a.y * b.x;
    cross.atan2(a.dot(&b)).abs()
}
