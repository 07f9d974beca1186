use std::path::PathBuf;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TriangulateError {
    #[error("focal length must be positive and finite, got {0}")]
    InvalidFocal(f64),
    #[error("baseline must be positive and finite, got {0}")]
    InvalidBaseline(f64),
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("cannot write point cloud to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
