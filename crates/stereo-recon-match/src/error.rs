use stereo_recon_core::ImageSize;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("left and right images differ in size ({left} vs {right})")]
    SizeMismatch { left: ImageSize, right: ImageSize },
    #[error("invalid matcher parameters: {0}")]
    InvalidParams(String),
}
