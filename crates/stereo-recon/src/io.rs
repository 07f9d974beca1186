//! Image files in and out of the pipeline (feature `image`).

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use stereo_recon_core::{GrayImage, GrayImageView};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// JPEG and PNG files directly inside `dir`, sorted by file name.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = dir.as_ref();
    let io_err = |source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if is_image && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Decode any supported image file to 8-bit grey.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, PipelineError> {
    let path = path.as_ref();
    let img = ::image::open(path)
        .map_err(|source| PipelineError::Codec {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    let (w, h) = (img.width() as usize, img.height() as usize);
    Ok(GrayImage::from_raw(w, h, img.into_raw())?)
}

/// Encode `img` with the format implied by the extension of `path`.
pub fn save_gray(path: impl AsRef<Path>, img: &GrayImage) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let codec_err = |source| PipelineError::Codec {
        path: path.to_path_buf(),
        source,
    };
    let buffer = ::image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .ok_or_else(|| {
            codec_err(::image::ImageError::Parameter(
                ::image::error::ParameterError::from_kind(
                    ::image::error::ParameterErrorKind::DimensionMismatch,
                ),
            ))
        })?;
    buffer.save(path).map_err(codec_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_images_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.png", "a.jpg", "c.txt", "d.JPEG"] {
            std::fs::write(dir.path().join(name), b"").expect("touch");
        }
        std::fs::create_dir(dir.path().join("e.png")).expect("subdir");

        let names: Vec<_> = list_images(dir.path())
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();
        assert_eq!(names, ["a.jpg", "b.png", "d.JPEG"]);
    }

    #[test]
    fn png_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gradient.png");
        let img = GrayImage::from_fn(12, 7, |x, y| (x * 20 + y) as u8);
        save_gray(&path, &img).expect("save");
        assert_eq!(load_gray(&path).expect("load"), img);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = list_images("/no/such/dir").expect_err("missing");
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
