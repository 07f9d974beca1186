use crate::disparity::{DisparityMap, StereoMatcher};
use crate::error::MatchError;
use crate::params::{DenseMatchParams, Prefilter};
use crate::prefilter::{self, box_sum, integral_image};
use crate::speckle::filter_speckles;
use log::debug;
use rayon::prelude::*;
use stereo_recon_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Rows matched by one worker. Column costs are updated incrementally
/// inside a band and rebuilt at its start.
const BAND_ROWS: usize = 32;

/// Sum-of-absolute-differences block matcher over rectified scanlines.
///
/// For a left pixel `(x, y)` the candidate at disparity `d` is the right
/// block centred on `(x - d, y)`. Only pixels whose whole search range fits
/// in the image are matched; the left border of width
/// `max_disparity + block_size / 2` and a `block_size / 2` frame stay
/// invalid.
#[derive(Clone, Debug)]
pub struct DenseMatcher {
    params: DenseMatchParams,
}

impl Default for DenseMatcher {
    fn default() -> Self {
        Self {
            params: DenseMatchParams::default(),
        }
    }
}

impl DenseMatcher {
    pub fn new(params: DenseMatchParams) -> Result<Self, MatchError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &DenseMatchParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, left, right), fields(w = left.width, h = left.height))
    )]
    pub fn compute(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<DisparityMap, MatchError> {
        if left.size() != right.size() {
            return Err(MatchError::SizeMismatch {
                left: left.size(),
                right: right.size(),
            });
        }
        let p = &self.params;
        let (w, h) = (left.width, left.height);
        let mut map = DisparityMap::invalid(w, h);
        let half = p.block_size / 2;
        if w < 2 * half + 1 + p.max_disparity() || h < 2 * half + 1 {
            debug!(
                "{}x{} is too small for block {} and disparity {}",
                w,
                h,
                p.block_size,
                p.max_disparity()
            );
            return Ok(map);
        }

        let (pl, pr) = rayon::join(
            || prefilter::apply(left, p.prefilter, p.prefilter_size, p.prefilter_cap),
            || prefilter::apply(right, p.prefilter, p.prefilter_size, p.prefilter_cap),
        );
        let texture = (p.texture_threshold > 0).then(|| {
            let cap = p.prefilter_cap;
            let sobel;
            let grad = if p.prefilter == Prefilter::XSobel {
                &pl
            } else {
                sobel = prefilter::x_sobel(left, cap);
                &sobel
            };
            integral_image(w, h, |x, y| u32::from(grad[y * w + x].abs_diff(cap)))
        });

        let scan = Scanner {
            params: p,
            left: &pl,
            right: &pr,
            texture: texture.as_deref(),
            width: w,
            height: h,
        };
        map.data
            .par_chunks_mut(w * BAND_ROWS)
            .enumerate()
            .for_each(|(band, out)| scan.band(band * BAND_ROWS, out));

        let matched = map.valid_count();
        let removed = filter_speckles(&mut map, p.speckle_window_size, p.speckle_range);
        debug!(
            "block matching {}x{}: {} matched, {} removed as speckles",
            w, h, matched, removed
        );
        Ok(map)
    }
}

impl StereoMatcher for DenseMatcher {
    type Output = DisparityMap;

    fn match_views(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<DisparityMap, MatchError> {
        self.compute(left, right)
    }
}

struct Scanner<'a> {
    params: &'a DenseMatchParams,
    left: &'a [u8],
    right: &'a [u8],
    texture: Option<&'a [u32]>,
    width: usize,
    height: usize,
}

impl Scanner<'_> {
    fn half(&self) -> usize {
        self.params.block_size / 2
    }

    /// Match rows `y0..` whose output row slices make up `out`.
    fn band(&self, y0: usize, out: &mut [Option<f32>]) {
        let (w, half) = (self.width, self.half());
        let nd = self.params.num_disparities;
        let begin = y0.max(half);
        let end = (y0 + out.len() / w).min(self.height - half);
        if begin >= end {
            return;
        }

        // cost[x * nd + k]: vertical block sum of |L - R| at disparity k.
        let mut cost = vec![0u32; w * nd];
        for j in begin - half..=begin + half {
            self.update_columns(&mut cost, j, true);
        }
        let mut sad = vec![0u32; nd];
        let mut best = vec![0usize; w];
        let mut right_best = vec![(u32::MAX, 0usize); w];

        for y in begin..end {
            if y > begin {
                self.update_columns(&mut cost, y + half, true);
                self.update_columns(&mut cost, y - half - 1, false);
            }
            let row = &mut out[(y - y0) * w..(y - y0 + 1) * w];
            self.row(y, &cost, &mut sad, &mut best, &mut right_best, row);
        }
    }

    fn update_columns(&self, cost: &mut [u32], j: usize, add: bool) {
        let w = self.width;
        let nd = self.params.num_disparities;
        let d_min = self.params.min_disparity;
        let l = &self.left[j * w..(j + 1) * w];
        let r = &self.right[j * w..(j + 1) * w];
        for x in self.params.max_disparity()..w {
            let cell = &mut cost[x * nd..(x + 1) * nd];
            for (k, c) in cell.iter_mut().enumerate() {
                let diff = u32::from(l[x].abs_diff(r[x - d_min - k]));
                if add {
                    *c += diff;
                } else {
                    *c -= diff;
                }
            }
        }
    }

    fn row(
        &self,
        y: usize,
        cost: &[u32],
        sad: &mut [u32],
        best: &mut [usize],
        right_best: &mut [(u32, usize)],
        out: &mut [Option<f32>],
    ) {
        let p = self.params;
        let (w, half, nd) = (self.width, self.half(), p.num_disparities);
        let x_lo = half + p.max_disparity();
        let x_hi = w - 1 - half;

        sad.fill(0);
        for x in x_lo - half..=x_lo + half {
            for (s, c) in sad.iter_mut().zip(&cost[x * nd..(x + 1) * nd]) {
                *s += c;
            }
        }
        right_best.fill((u32::MAX, 0));

        for x in x_lo..=x_hi {
            if x > x_lo {
                let add = &cost[(x + half) * nd..(x + half + 1) * nd];
                let sub = &cost[(x - half - 1) * nd..(x - half) * nd];
                for ((s, a), b) in sad.iter_mut().zip(add).zip(sub) {
                    *s = *s + a - b;
                }
            }

            let (k_best, c_best) = argmin(sad);
            best[x] = k_best;
            if p.disp12_max_diff.is_some() {
                for (k, &c) in sad.iter().enumerate() {
                    let xr = x - p.min_disparity - k;
                    if c < right_best[xr].0 {
                        right_best[xr] = (c, k);
                    }
                }
            }

            out[x] = if self.textured(x, y) && unique(sad, k_best, c_best, p.uniqueness_ratio) {
                let offset = if p.subpixel {
                    subpixel_offset(sad, k_best)
                } else {
                    0.0
                };
                Some((p.min_disparity + k_best) as f32 + offset)
            } else {
                None
            };
        }

        if let Some(max_diff) = p.disp12_max_diff {
            for x in x_lo..=x_hi {
                if out[x].is_none() {
                    continue;
                }
                let xr = x - p.min_disparity - best[x];
                let (c, k) = right_best[xr];
                if c == u32::MAX || (k as f32 - best[x] as f32).abs() > max_diff {
                    out[x] = None;
                }
            }
        }
    }

    fn textured(&self, x: usize, y: usize) -> bool {
        let Some(table) = self.texture else {
            return true;
        };
        let half = self.half();
        let sum = box_sum(
            table,
            self.width,
            x - half,
            y - half,
            x + half + 1,
            y + half + 1,
        );
        sum >= self.params.texture_threshold
    }
}

/// Lowest cost and its index; ties go to the smallest disparity.
fn argmin(sad: &[u32]) -> (usize, u32) {
    sad.iter()
        .enumerate()
        .fold((0, u32::MAX), |acc, (k, &c)| if c < acc.1 { (k, c) } else { acc })
}

/// No candidate outside the immediate neighbours of the best one may come
/// within `ratio` percent of its cost.
fn unique(sad: &[u32], k_best: usize, c_best: u32, ratio: u32) -> bool {
    if ratio == 0 {
        return true;
    }
    let limit = u64::from(c_best) * 100;
    sad.iter().enumerate().all(|(k, &c)| {
        k.abs_diff(k_best) <= 1 || u64::from(c) * u64::from(100 - ratio) >= limit
    })
}

/// Vertex of the parabola through the best cost and its neighbours, in
/// `[-0.5, 0.5]`. Zero at the ends of the search range.
fn subpixel_offset(sad: &[u32], k: usize) -> f32 {
    if k == 0 || k + 1 >= sad.len() {
        return 0.0;
    }
    let (prev, c, next) = (sad[k - 1] as f32, sad[k] as f32, sad[k + 1] as f32);
    let denom = prev + next - 2.0 * c;
    if denom <= 0.0 {
        return 0.0;
    }
    ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn argmin_prefers_the_smallest_disparity() {
        assert_eq!(argmin(&[5, 3, 3, 9]), (1, 3));
    }

    #[test]
    fn uniqueness_ignores_direct_neighbours() {
        // Neighbour 11 is close to 10 but adjacent; 30 is far enough.
        assert!(unique(&[30, 11, 10, 30], 2, 10, 15));
        // 11 two steps away fails a 15% margin.
        assert!(!unique(&[11, 30, 10, 30], 2, 10, 15));
        assert!(unique(&[11, 30, 10, 30], 2, 10, 0));
    }

    #[test]
    fn parabola_vertex_leans_to_the_cheaper_side() {
        assert_relative_eq!(subpixel_offset(&[20, 10, 20], 1), 0.0);
        assert!(subpixel_offset(&[14, 10, 30], 1) < 0.0);
        assert!(subpixel_offset(&[30, 10, 14], 1) > 0.0);
        assert_relative_eq!(subpixel_offset(&[10, 20], 0), 0.0);
    }

    #[test]
    fn invalid_params_are_rejected_up_front() {
        let err = DenseMatcher::new(DenseMatchParams {
            num_disparities: 0,
            ..DenseMatchParams::default()
        })
        .expect_err("zero range");
        assert!(matches!(err, MatchError::InvalidParams(_)));
    }
}
