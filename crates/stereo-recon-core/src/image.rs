use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while building or splitting grayscale images.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("invalid grayscale buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },

    #[error("empty image ({0})")]
    Empty(ImageSize),

    #[error("side-by-side image width {width} does not split into equal halves")]
    OddWidth { width: usize },

    #[error("stereo halves differ in size (left {left}, right {right})")]
    HalvesMismatch { left: ImageSize, right: ImageSize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wrap a row-major buffer, checking its length.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width
            .checked_mul(height)
            .ok_or(ImageError::Empty(ImageSize::new(width, height)))?;
        if data.len() != expected {
            return Err(ImageError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy the `width`x`height` window whose top-left corner is `(x0, 0)`.
    fn columns(src: &GrayImageView<'_>, x0: usize, width: usize) -> Self {
        let mut data = Vec::with_capacity(width * src.height);
        for y in 0..src.height {
            data.extend_from_slice(&src.row(y)[x0..x0 + width]);
        }
        Self {
            width,
            height: src.height,
            data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample; pixels outside the image read as zero.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// One stereo capture: left and right halves of identical size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePair {
    pub left: GrayImage,
    pub right: GrayImage,
}

impl ImagePair {
    pub fn new(left: GrayImage, right: GrayImage) -> Result<Self, ImageError> {
        if left.size() != right.size() {
            return Err(ImageError::HalvesMismatch {
                left: left.size(),
                right: right.size(),
            });
        }
        if left.size().is_empty() {
            return Err(ImageError::Empty(left.size()));
        }
        Ok(Self { left, right })
    }

    /// Split a side-by-side capture at its horizontal midpoint.
    pub fn split_side_by_side(src: &GrayImageView<'_>) -> Result<Self, ImageError> {
        if src.width % 2 != 0 {
            return Err(ImageError::OddWidth { width: src.width });
        }
        let half = src.width / 2;
        if half == 0 || src.height == 0 {
            return Err(ImageError::Empty(src.size()));
        }
        Ok(Self {
            left: GrayImage::columns(src, 0, half),
            right: GrayImage::columns(src, half, half),
        })
    }

    /// Size of one half.
    pub fn size(&self) -> ImageSize {
        self.left.size()
    }

    /// Join both halves back into one side-by-side image.
    pub fn to_side_by_side(&self) -> GrayImage {
        let half = self.left.width;
        let mut data = Vec::with_capacity(2 * self.left.data.len());
        for y in 0..self.left.height {
            data.extend_from_slice(&self.left.data[y * half..(y + 1) * half]);
            data.extend_from_slice(&self.right.data[y * half..(y + 1) * half]);
        }
        GrayImage {
            width: 2 * half,
            height: self.left.height,
            data,
        }
    }
}
