use crate::error::WriteError;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Line layout of a written point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointFormat {
    /// `x y z`
    #[default]
    Xyz,
    /// Wavefront OBJ vertex, `v x y z`.
    Obj,
}

/// Write one line per point to `out`. Returns the number of points.
pub fn write_points_to<W: Write>(
    mut out: W,
    points: impl IntoIterator<Item = Point3<f64>>,
    format: PointFormat,
) -> io::Result<usize> {
    let mut count = 0;
    for p in points {
        match format {
            PointFormat::Xyz => writeln!(out, "{} {} {}", p.x, p.y, p.z)?,
            PointFormat::Obj => writeln!(out, "v {} {} {}", p.x, p.y, p.z)?,
        }
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// Create (or truncate) `path` and write `points` into it.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn write_points(
    path: impl AsRef<Path>,
    points: impl IntoIterator<Item = Point3<f64>>,
    format: PointFormat,
) -> Result<usize, WriteError> {
    let path = path.as_ref();
    let io_err = |source: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let count = write_points_to(BufWriter::new(file), points, format).map_err(io_err)?;
    log::debug!("wrote {} points to {}", count, path.display());
    Ok(count)
}
