//! Checkerboard detector for calibration images.
//!
//! ## Quickstart
//!
//! ```
//! use stereo_recon_chessboard::{ChessboardParams, PatternDetector};
//! use stereo_recon_core::{GrayImage, Pattern};
//!
//! let detector = PatternDetector::new(Pattern::default(), ChessboardParams::default());
//! let img = GrayImage::new(64, 48);
//! assert!(detector.detect(&img.view()).is_none());
//! ```
//!
//! Algorithm:
//! 1. The `chess-corners` ChESS detector gives sub-pixel corner candidates;
//!    the bright diagonal of each fitted corner becomes its orientation.
//! 2. A kd-tree proposes nearby corners; a pair becomes a grid edge when the
//!    two orientations are orthogonal and the edge runs at 45° to both.
//! 3. BFS over each connected component assigns integer grid coordinates,
//!    tracking local grid axes so perspective and rotation are tolerated.
//! 4. A fully populated W×H window is cut out, checked against a fitted
//!    homography, and put into a canonical row-major order.
//! 5. Every corner is refined with the gradient-orthogonality iteration.

mod corners;
mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use corners::{default_chess_config, find_corners, Corner};
pub use detector::PatternDetector;
pub use gridgraph::{assign_grid_coordinates, connected_components, GridGraph, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};

pub use chess_corners::ChessConfig;
