//! Oriented FAST keypoints with rotated BRIEF descriptors.

use crate::params::OrbParams;
use std::sync::OnceLock;
use stereo_recon_core::GrayImageView;

/// Radius of the intensity-centroid patch (31 px wide).
pub(crate) const PATCH_RADIUS: usize = 15;
/// Test points of the binary pattern lie in `[-13, 13]^2`.
const PATTERN_EXTENT: i32 = 13;
const DESCRIPTOR_BITS: usize = 256;
const HARRIS_BLOCK: usize = 7;

/// 256-bit binary descriptor.
pub type Descriptor = [u8; 32];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Position in full-resolution pixels.
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// Harris response on the detection level.
    pub response: f32,
    pub level: usize,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Float plane used for pyramid levels.
#[derive(Clone, Debug)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_view(src: &GrayImageView<'_>) -> Self {
        Self {
            width: src.width,
            height: src.height,
            data: src.data.iter().map(|&v| f32::from(v)).collect(),
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Separable Gaussian with replicated borders.
    fn blur(&self, sigma: f32) -> Self {
        let radius = (3.0 * sigma).ceil().max(1.0) as i64;
        let mut kernel: Vec<f32> = (-radius..=radius)
            .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
            .collect();
        let norm: f32 = kernel.iter().sum();
        kernel.iter_mut().for_each(|k| *k /= norm);

        let (w, h) = (self.width as i64, self.height as i64);
        let clamp = |v: i64, n: i64| v.clamp(0, n - 1) as usize;
        let mut tmp = vec![0f32; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for (k, i) in kernel.iter().zip(-radius..=radius) {
                    acc += k * self.at(clamp(x + i, w), y as usize);
                }
                tmp[(y * w + x) as usize] = acc;
            }
        }
        let mut data = vec![0f32; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for (k, i) in kernel.iter().zip(-radius..=radius) {
                    acc += k * tmp[clamp(y + i, h) * self.width + x as usize];
                }
                data[(y * w + x) as usize] = acc;
            }
        }
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Smooth, then resample to `ceil(size / factor)` bilinearly.
    fn reduce(&self, factor: f32) -> Self {
        let smooth = self.blur(2.0 * factor / 6.0);
        let width = (self.width as f32 / factor).ceil() as usize;
        let height = (self.height as f32 / factor).ceil() as usize;
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (self.width - 1) as f32);
                let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (self.height - 1) as f32);
                data.push(smooth.bilinear(fx, fy));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    fn bilinear(&self, x: f32, y: f32) -> f32 {
        let (x0, y0) = (x.floor() as usize, y.floor() as usize);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (ax, ay) = (x - x0 as f32, y - y0 as f32);
        let top = self.at(x0, y0) * (1.0 - ax) + self.at(x1, y0) * ax;
        let bottom = self.at(x0, y1) * (1.0 - ax) + self.at(x1, y1) * ax;
        top * (1.0 - ay) + bottom * ay
    }
}

/// Bresenham circle of radius 3 used by FAST, clockwise from the top.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// FAST-9: nine contiguous circle pixels all brighter or all darker than
/// the centre by more than `threshold`.
fn is_fast_corner(img: &Plane, x: usize, y: usize, threshold: f32) -> bool {
    let c = img.at(x, y);
    let ring = CIRCLE.map(|(dx, dy)| {
        let v = img.at((x as i32 + dx) as usize, (y as i32 + dy) as usize);
        if v > c + threshold {
            1i8
        } else if v < c - threshold {
            -1
        } else {
            0
        }
    });
    for sign in [1i8, -1] {
        let mut run = 0;
        for i in 0..CIRCLE.len() + 8 {
            if ring[i % CIRCLE.len()] == sign {
                run += 1;
                if run >= 9 {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }
    false
}

/// Harris response over a `HARRIS_BLOCK` window of central differences.
fn harris_response(img: &Plane, x: usize, y: usize, k: f32) -> f32 {
    let r = HARRIS_BLOCK as i64 / 2;
    let (mut xx, mut yy, mut xy) = (0f32, 0f32, 0f32);
    for dy in -r..=r {
        for dx in -r..=r {
            let px = (x as i64 + dx) as usize;
            let py = (y as i64 + dy) as usize;
            let gx = 0.5 * (img.at(px + 1, py) - img.at(px - 1, py));
            let gy = 0.5 * (img.at(px, py + 1) - img.at(px, py - 1));
            xx += gx * gx;
            yy += gy * gy;
            xy += gx * gy;
        }
    }
    let trace = xx + yy;
    xx * yy - xy * xy - k * trace * trace
}

/// Angle of the intensity centroid in a circular patch.
fn orientation(img: &Plane, x: usize, y: usize) -> f32 {
    let r = PATCH_RADIUS as i64;
    let (mut m01, mut m10) = (0f32, 0f32);
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let v = img.at((x as i64 + dx) as usize, (y as i64 + dy) as usize);
            m10 += v * dx as f32;
            m01 += v * dy as f32;
        }
    }
    m01.atan2(m10)
}

/// Test point pairs `(x0, y0, x1, y1)`, drawn once from a fixed seed with an
/// approximately Gaussian spread.
fn sampling_pattern() -> &'static [[i8; 4]; DESCRIPTOR_BITS] {
    static PATTERN: OnceLock<[[i8; 4]; DESCRIPTOR_BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut state = 0x9e37_79b9u32;
        let mut uniform = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as f32 / u32::MAX as f32
        };
        // Sum of four uniforms has variance 1/3; scale to sigma = 31 / 5.
        let sigma = 31.0 / 5.0;
        let mut gauss = move || {
            let s: f32 = (0..4).map(|_| uniform()).sum::<f32>() - 2.0;
            let v = (s * 3f32.sqrt() * sigma).round() as i32;
            v.clamp(-PATTERN_EXTENT, PATTERN_EXTENT) as i8
        };
        let mut pattern = [[0i8; 4]; DESCRIPTOR_BITS];
        for pair in pattern.iter_mut() {
            *pair = [gauss(), gauss(), gauss(), gauss()];
        }
        pattern
    })
}

fn describe(img: &Plane, x: usize, y: usize, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let sample = |px: i8, py: i8| {
        let (px, py) = (f32::from(px), f32::from(py));
        let rx = (x as f32 + cos * px - sin * py).round() as i64;
        let ry = (y as f32 + sin * px + cos * py).round() as i64;
        let rx = rx.clamp(0, img.width as i64 - 1) as usize;
        let ry = ry.clamp(0, img.height as i64 - 1) as usize;
        img.at(rx, ry)
    };
    let mut desc = [0u8; 32];
    for (bit, &[x0, y0, x1, y1]) in sampling_pattern().iter().enumerate() {
        if sample(x0, y0) < sample(x1, y1) {
            desc[bit / 8] |= 1 << (bit % 8);
        }
    }
    desc
}

/// ORB-style feature extractor over an image pyramid.
#[derive(Clone, Debug, Default)]
pub struct OrbExtractor {
    params: OrbParams,
}

impl OrbExtractor {
    pub fn new(params: OrbParams) -> Self {
        Self { params }
    }

    /// Geometric share of the keypoint budget per level, finest first.
    fn features_per_level(&self, levels: usize) -> Vec<usize> {
        let total = self.params.max_features;
        let factor = 1.0 / self.params.scale_factor;
        let mut desired = total as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
        let mut out = vec![0usize; levels];
        let mut sum = 0;
        for n in out.iter_mut().take(levels - 1) {
            *n = desired.round().max(0.0) as usize;
            sum += *n;
            desired *= factor;
        }
        out[levels - 1] = total.saturating_sub(sum);
        out
    }

    fn pyramid(&self, src: &GrayImageView<'_>) -> Vec<Plane> {
        let min_side = 2 * self.params.edge_threshold.max(PATCH_RADIUS) + 1;
        let mut levels = vec![Plane::from_view(src)];
        while levels.len() < self.params.levels.max(1) {
            let Some(last) = levels.last() else { break };
            let next = last.reduce(self.params.scale_factor);
            if next.width < min_side || next.height < min_side {
                break;
            }
            levels.push(next);
        }
        levels
    }

    /// Keypoints and descriptors, strongest first within each level and
    /// levels from fine to coarse.
    pub fn extract(&self, src: &GrayImageView<'_>) -> Features {
        let p = &self.params;
        let edge = p.edge_threshold.max(PATCH_RADIUS);
        if src.width < 2 * edge + 1 || src.height < 2 * edge + 1 || p.max_features == 0 {
            return Features::default();
        }

        let pyramid = self.pyramid(src);
        let budget = self.features_per_level(pyramid.len());
        let mut features = Features::default();
        let mut scale = 1.0f32;

        for (level, (img, &quota)) in pyramid.iter().zip(&budget).enumerate() {
            let (w, h) = (img.width, img.height);
            let threshold = f32::from(p.fast_threshold);
            let mut response = vec![f32::NEG_INFINITY; w * h];
            let mut corners = Vec::new();
            for y in edge..h - edge {
                for x in edge..w - edge {
                    if is_fast_corner(img, x, y, threshold) {
                        response[y * w + x] = harris_response(img, x, y, p.harris_k);
                        corners.push((x, y));
                    }
                }
            }

            // 3x3 non-maximum suppression among corners.
            let mut kept: Vec<(usize, usize, f32)> = corners
                .into_iter()
                .filter_map(|(x, y)| {
                    let r = response[y * w + x];
                    let is_peak = (y - 1..=y + 1)
                        .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (nx, ny)))
                        .all(|(nx, ny)| {
                            let other = response[ny * w + nx];
                            (nx, ny) == (x, y) || other < r || (other == r && (ny, nx) > (y, x))
                        });
                    is_peak.then_some((x, y, r))
                })
                .collect();
            kept.sort_by(|a, b| b.2.total_cmp(&a.2));
            kept.truncate(quota);

            let smooth = img.blur(p.descriptor_sigma);
            for (x, y, r) in kept {
                let angle = orientation(img, x, y);
                features.keypoints.push(Keypoint {
                    x: x as f32 * scale,
                    y: y as f32 * scale,
                    angle,
                    response: r,
                    level,
                });
                features.descriptors.push(describe(&smooth, x, y, angle));
            }
            scale *= p.scale_factor;
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::GrayImage;

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[0] = 0b1011;
        b[31] = 0xff;
        assert_eq!(hamming_distance(&a, &b), 11);
        assert_eq!(hamming_distance(&b, &b), 0);
    }

    #[test]
    fn budget_sums_to_the_cap() {
        let orb = OrbExtractor::new(OrbParams {
            max_features: 500,
            ..OrbParams::default()
        });
        let split = orb.features_per_level(8);
        assert_eq!(split.iter().sum::<usize>(), 500);
        assert!(split[0] > split[7]);
    }

    #[test]
    fn bright_square_corner_is_fast() {
        let img = GrayImage::from_fn(16, 16, |x, y| if x >= 8 && y >= 8 { 200 } else { 20 });
        let plane = Plane::from_view(&img.view());
        assert!(is_fast_corner(&plane, 8, 8, 20.0));
        assert!(!is_fast_corner(&plane, 3, 3, 20.0));
        assert!(harris_response(&plane, 8, 8, 0.04) > 0.0);
    }

    #[test]
    fn orientation_points_toward_the_bright_side() {
        let img = GrayImage::from_fn(41, 41, |x, _| if x > 20 { 255 } else { 0 });
        let angle = orientation(&Plane::from_view(&img.view()), 20, 20);
        assert!(angle.abs() < 1e-3);
    }

    #[test]
    fn pattern_is_stable_and_bounded() {
        let a = sampling_pattern();
        let b = sampling_pattern();
        assert_eq!(a, b);
        assert!(a.iter().flatten().all(|&v| i32::from(v).abs() <= PATTERN_EXTENT));
        assert!(a.iter().any(|p| p[0] != p[2] || p[1] != p[3]));
    }

    #[test]
    fn flat_and_tiny_images_have_no_features() {
        let flat = GrayImage::from_fn(96, 96, |_, _| 128);
        assert!(OrbExtractor::default().extract(&flat.view()).is_empty());
        let tiny = GrayImage::from_fn(10, 10, |x, _| (x * 20) as u8);
        assert!(OrbExtractor::default().extract(&tiny.view()).is_empty());
    }
}
