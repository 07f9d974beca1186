use stereo_recon_core::{GrayImage, ImagePair};
use stereo_recon_match::{
    DenseMatchParams, DenseMatcher, DisparitySource, MatchError, Prefilter, StereoMatcher,
};

fn noise(width: usize, height: usize, seed: u32) -> GrayImage {
    let mut state = seed;
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    })
}

/// Left and right views of a fronto-parallel texture at disparity `shift`.
fn shifted_pair(width: usize, height: usize, shift: usize) -> ImagePair {
    let base = noise(width + shift, height, 7);
    let left = GrayImage::from_fn(width, height, |x, y| base.get(x, y));
    let right = GrayImage::from_fn(width, height, |x, y| base.get(x + shift, y));
    ImagePair { left, right }
}

fn small_params() -> DenseMatchParams {
    DenseMatchParams {
        num_disparities: 16,
        block_size: 9,
        speckle_window_size: 20,
        ..DenseMatchParams::default()
    }
}

#[test]
fn recovers_a_constant_shift() {
    let pair = shifted_pair(96, 64, 5);
    let map = DenseMatcher::new(small_params())
        .expect("params")
        .match_pair(&pair)
        .expect("match");

    // Matchable region: x in [4 + 15, 91], y in [4, 59].
    let matchable = 73 * 56;
    assert!(map.valid_count() * 10 >= matchable * 9, "{}", map.valid_count());
    for p in map.disparities() {
        assert!((p.disparity - 5.0).abs() <= 0.5, "{p:?}");
    }
    assert_eq!(map.get(2, 30), None);
    assert_eq!(map.get(50, 1), None);
}

#[test]
fn disparities_stay_in_the_search_window() {
    let pair = ImagePair {
        left: noise(80, 48, 1),
        right: noise(80, 48, 2),
    };
    let params = DenseMatchParams {
        min_disparity: 2,
        uniqueness_ratio: 0,
        speckle_window_size: 0,
        ..small_params()
    };
    let (lo, hi) = (params.min_disparity as f32, params.max_disparity() as f32);
    let map = DenseMatcher::new(params).expect("params").match_pair(&pair).expect("match");
    assert!(map.valid_count() > 0);
    assert!(map.disparities().all(|p| p.disparity >= lo && p.disparity <= hi));
}

#[test]
fn flat_images_have_no_matches() {
    let flat = GrayImage::from_fn(64, 40, |_, _| 128);
    let pair = ImagePair {
        left: flat.clone(),
        right: flat,
    };
    let map = DenseMatcher::new(small_params()).expect("params").match_pair(&pair).expect("match");
    assert_eq!(map.valid_count(), 0);
    assert_eq!(map.size(), pair.size());
}

#[test]
fn left_right_check_keeps_consistent_matches() {
    let pair = shifted_pair(96, 64, 7);
    let params = DenseMatchParams {
        disp12_max_diff: Some(1.0),
        prefilter: Prefilter::NormalizedResponse,
        ..small_params()
    };
    let map = DenseMatcher::new(params).expect("params").match_pair(&pair).expect("match");
    assert!(map.valid_count() * 10 >= 73 * 56 * 8);
    assert!(map.disparities().all(|p| (p.disparity - 7.0).abs() <= 0.5));
}

#[test]
fn images_smaller_than_the_search_are_all_invalid() {
    let pair = shifted_pair(20, 64, 2);
    let map = DenseMatcher::new(small_params()).expect("params").match_pair(&pair).expect("match");
    assert_eq!(map.valid_count(), 0);
    assert_eq!(map.data.len(), 20 * 64);
}

#[test]
fn views_of_different_size_are_rejected() {
    let left = noise(64, 40, 1);
    let right = noise(62, 40, 2);
    let err = DenseMatcher::default()
        .compute(&left.view(), &right.view())
        .expect_err("size mismatch");
    assert!(matches!(err, MatchError::SizeMismatch { .. }));
}
