use nalgebra::{Matrix3, Rotation3, Vector3};
use stereo_recon_core::{
    CalibrationResult, CameraIntrinsics, Distortion, GrayImage, ImagePair, ImageSize, StereoExtrinsics,
};
use stereo_recon_rectify::{RectificationEngine, RectifyError, RectifyParams};

fn calibration(rotation: Matrix3<f64>, size: Option<ImageSize>) -> CalibrationResult {
    let left = CameraIntrinsics::new(
        420.0,
        421.0,
        161.0,
        119.0,
        Distortion {
            k1: -0.05,
            ..Distortion::default()
        },
    );
    let right = CameraIntrinsics::new(418.0, 419.5, 158.5, 121.0, Distortion::default());
    let translation = Vector3::new(-0.08, 0.001, 0.0);
    CalibrationResult {
        extrinsics: StereoExtrinsics::from_rt(rotation, translation, &left, &right).expect("K"),
        left,
        right,
        image_size: size,
        rms: Some(0.3),
    }
}

fn textured(width: usize, height: usize, seed: u32) -> GrayImage {
    let mut state = seed;
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    })
}

#[test]
fn maps_are_deterministic() {
    let calib = calibration(
        Rotation3::from_euler_angles(0.01, 0.02, -0.005).into_inner(),
        Some(ImageSize::new(320, 240)),
    );
    let a = RectificationEngine::new(&calib, ImageSize::new(320, 240), &RectifyParams::default()).expect("a");
    let b = RectificationEngine::new(&calib, ImageSize::new(320, 240), &RectifyParams::default()).expect("b");
    assert_eq!(a.left_map(), b.left_map());
    assert_eq!(a.right_map(), b.right_map());
    assert_eq!(a.rectification(), b.rectification());
}

#[test]
fn calibrated_size_must_match() {
    let calib = calibration(Matrix3::identity(), Some(ImageSize::new(640, 480)));
    let err = RectificationEngine::new(&calib, ImageSize::new(320, 240), &RectifyParams::default())
        .expect_err("size mismatch");
    assert_eq!(
        err,
        RectifyError::ShapeMismatch {
            expected: ImageSize::new(640, 480),
            actual: ImageSize::new(320, 240),
        }
    );
}

#[test]
fn apply_rejects_a_pair_of_another_size() {
    let calib = calibration(Matrix3::identity(), None);
    let engine = RectificationEngine::new(&calib, ImageSize::new(320, 240), &RectifyParams::default())
        .expect("engine");
    let pair = ImagePair::new(textured(160, 120, 1), textured(160, 120, 2)).expect("pair");
    assert!(matches!(
        engine.apply(&pair),
        Err(RectifyError::ShapeMismatch { .. })
    ));
}

#[test]
fn apply_keeps_size_and_fills_the_centre() {
    let calib = calibration(
        Rotation3::from_euler_angles(0.0, 0.01, 0.0).into_inner(),
        Some(ImageSize::new(320, 240)),
    );
    let engine = RectificationEngine::new(&calib, ImageSize::new(320, 240), &RectifyParams::default())
        .expect("engine");
    let pair = ImagePair::new(
        GrayImage::from_fn(320, 240, |_, _| 180),
        GrayImage::from_fn(320, 240, |_, _| 90),
    )
    .expect("pair");
    let out = engine.apply(&pair).expect("apply");
    assert_eq!(out.size(), ImageSize::new(320, 240));
    // alpha = 0 keeps only valid pixels, so the centre reads the source.
    assert_eq!(out.left.get(160, 120), 180);
    assert_eq!(out.right.get(160, 120), 90);
}
