use stereo_recon_core::ImageSize;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RectifyError {
    #[error("image size {actual} does not match the calibrated size {expected}")]
    ShapeMismatch {
        expected: ImageSize,
        actual: ImageSize,
    },
    #[error("cannot rectify an empty image ({0})")]
    EmptyImage(ImageSize),
    #[error("stereo baseline is zero")]
    DegenerateBaseline,
    #[error("camera matrix is singular or has a non-positive focal length")]
    SingularIntrinsics,
}
