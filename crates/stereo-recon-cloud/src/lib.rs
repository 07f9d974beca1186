//! Metric reconstruction from rectified correspondences.
//!
//! A [`Triangulator`] turns each left-rectified pixel `(u, v)` with
//! disparity `d` into `Z = f * B / d`, `X = (u - cx) * Z / f`,
//! `Y = (v - cy) * Z / f` in the left rectified camera frame. Entries at or
//! below the minimum disparity are skipped and the remaining points keep
//! their input order. [`write_points`] stores them one point per line.

mod error;
mod triangulate;
mod writer;

pub use error::{TriangulateError, WriteError};
pub use triangulate::{TriangulationParams, Triangulator};
pub use writer::{write_points, write_points_to, PointFormat};
