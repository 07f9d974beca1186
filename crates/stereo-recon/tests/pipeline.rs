use approx::assert_relative_eq;
use nalgebra::{Matrix3, Rotation3, Vector3};
use stereo_recon::calib::CalibrationError;
use stereo_recon::core::{CameraIntrinsics, Distortion, Pattern, StereoExtrinsics};
use stereo_recon::{pipeline, CalibrationResult, GrayImage, ImagePair, ImageSize, PipelineConfig, PipelineError};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noise(width: usize, height: usize, seed: u32) -> GrayImage {
    let mut state = seed;
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    })
}

/// Side-by-side capture of a fronto-parallel texture at disparity `shift`.
fn capture(width: usize, height: usize, shift: usize) -> GrayImage {
    let base = noise(width + shift, height, 3);
    ImagePair {
        left: GrayImage::from_fn(width, height, |x, y| base.get(x, y)),
        right: GrayImage::from_fn(width, height, |x, y| base.get(x + shift, y)),
    }
    .to_side_by_side()
}

/// Two identical distortion-free cameras 0.1 apart along x.
fn parallel_rig(size: ImageSize) -> CalibrationResult {
    let cam = CameraIntrinsics::new(
        400.0,
        400.0,
        (size.width as f64 - 1.0) / 2.0,
        (size.height as f64 - 1.0) / 2.0,
        Distortion::default(),
    );
    CalibrationResult {
        extrinsics: StereoExtrinsics::from_rt(Matrix3::identity(), Vector3::new(-0.1, 0.0, 0.0), &cam, &cam)
            .expect("rig"),
        left: cam,
        right: cam,
        image_size: Some(size),
        rms: None,
    }
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.dense.num_disparities = 16;
    config.dense.block_size = 9;
    config.dense.speckle_window_size = 20;
    config
}

#[test]
fn zero_detections_raise_a_calibration_error() {
    init_logs();
    let blank = GrayImage::new(128, 48);
    let err = pipeline::calibrate_images(&[blank.clone(), blank], &PipelineConfig::default())
        .expect_err("nothing to calibrate");
    assert!(matches!(
        err,
        PipelineError::Calibration(CalibrationError::NoValidPairs)
    ));

    let detected = pipeline::detect_views(&[GrayImage::new(64, 32)], &PipelineConfig::default());
    assert!(detected.views.is_empty());
    assert_eq!(detected.skipped, vec![0]);
    assert_eq!(detected.image_size, Some(ImageSize::new(32, 32)));
}

#[test]
fn unusable_captures_are_skipped() {
    init_logs();
    let images = [
        GrayImage::new(64, 32),
        GrayImage::new(63, 32),
        GrayImage::new(64, 32),
        GrayImage::new(80, 32),
    ];
    let detected = pipeline::detect_views(&images, &PipelineConfig::default());
    assert!(detected.views.is_empty());
    assert_eq!(detected.image_size, Some(ImageSize::new(32, 32)));
    assert_eq!(detected.skipped, vec![0, 1, 2, 3]);
}

#[test]
fn batch_of_unsplittable_captures_has_no_size() {
    let detected = pipeline::detect_views(&[GrayImage::new(65, 32)], &PipelineConfig::default());
    assert_eq!(detected.image_size, None);
    assert_eq!(detected.skipped, vec![0]);

    let err = pipeline::calibrate_images(&[GrayImage::new(65, 32)], &PipelineConfig::default())
        .expect_err("nothing to calibrate");
    assert!(matches!(
        err,
        PipelineError::Calibration(CalibrationError::NoValidPairs)
    ));
}

/// Camera pair used to render calibration captures.
struct RenderRig {
    left: CameraIntrinsics,
    right: CameraIntrinsics,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

fn render_rig() -> RenderRig {
    RenderRig {
        left: CameraIntrinsics::new(600.0, 600.0, 239.5, 179.5, Distortion::default()),
        right: CameraIntrinsics::new(604.0, 604.0, 241.0, 178.0, Distortion::default()),
        rotation: Rotation3::from_euler_angles(0.004, -0.008, 0.002).into_inner(),
        translation: Vector3::new(-0.1, 0.0, 0.0),
    }
}

/// Checkerboard seen through the pinhole `k`, board frame mapped into the
/// camera frame by `(r, t)`. Squares cover `[-s, cols * s] x [-s, rows * s]`
/// so interior corner `(i, j)` sits at `(i * s, j * s)`, matching
/// `Pattern::object_points`.
fn render_board(
    k: &Matrix3<f64>,
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    pattern: &Pattern,
    size: ImageSize,
) -> GrayImage {
    const SS: usize = 3;
    let k_inv = k.try_inverse().expect("invertible K");
    let normal: Vector3<f64> = r.column(2).into_owned();
    let plane = normal.dot(t);
    let s = pattern.square_size;
    let (cols, rows) = ((pattern.cols + 1) as f64, (pattern.rows + 1) as f64);

    GrayImage::from_fn(size.width, size.height, |x, y| {
        let mut acc = 0u32;
        for sy in 0..SS {
            for sx in 0..SS {
                let u = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                let v = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                let ray = k_inv * Vector3::new(u, v, 1.0);
                let denom = normal.dot(&ray);
                let mut level = 225;
                if denom.abs() > 1e-12 && plane / denom > 0.0 {
                    let b = r.transpose() * (ray * (plane / denom) - t);
                    let (bx, by) = (b.x / s + 1.0, b.y / s + 1.0);
                    let inside = bx >= 0.0 && by >= 0.0 && bx < cols && by < rows;
                    if inside && (bx.floor() as i64 + by.floor() as i64) % 2 == 0 {
                        level = 30;
                    }
                }
                acc += level;
            }
        }
        (acc / (SS * SS) as u32) as u8
    })
}

/// Side-by-side captures of the board under tilts in every direction, held
/// between the two cameras at 0.58 to 0.70 units.
fn calibration_captures(rig: &RenderRig, pattern: &Pattern, size: ImageSize) -> Vec<GrayImage> {
    let s = pattern.square_size;
    let centre = Vector3::new(
        (pattern.cols - 1) as f64 * s * 0.5,
        (pattern.rows - 1) as f64 * s * 0.5,
        0.0,
    );
    let poses = [
        ((0.25, 0.0, 0.0), 0.60),
        ((-0.25, 0.05, 0.03), 0.62),
        ((0.0, 0.3, -0.04), 0.66),
        ((0.05, -0.3, 0.05), 0.58),
        ((0.2, 0.2, -0.06), 0.70),
        ((-0.2, -0.2, 0.06), 0.64),
    ];
    poses
        .iter()
        .map(|&((roll, pitch, yaw), z)| {
            let r = Rotation3::from_euler_angles(roll, pitch, yaw).into_inner();
            let t = Vector3::new(0.05, 0.0, z) - r * centre;
            let left = render_board(&rig.left.k, &r, &t, pattern, size);
            let right = render_board(
                &rig.right.k,
                &(rig.rotation * r),
                &(rig.rotation * t + rig.translation),
                pattern,
                size,
            );
            ImagePair { left, right }.to_side_by_side()
        })
        .collect()
}

#[test]
fn rendered_boards_recover_the_rig() {
    init_logs();
    let rig = render_rig();
    let size = ImageSize::new(480, 360);
    let mut config = PipelineConfig::default();
    config.pattern = Pattern::new(7, 5, 0.03);
    config.chessboard.subpix.half_window = 5;

    let mut captures = calibration_captures(&rig, &config.pattern, size);
    // an unusable capture in the batch is skipped, not fatal
    captures.insert(2, GrayImage::new(961, 360));

    let calibration = pipeline::calibrate_images(&captures, &config).expect("calibration");
    let result = &calibration.result;
    assert_eq!(result.image_size, Some(size));
    assert_relative_eq!(result.left.fx(), rig.left.fx(), max_relative = 0.02);
    assert_relative_eq!(result.left.fy(), rig.left.fy(), max_relative = 0.02);
    assert_relative_eq!(result.right.fx(), rig.right.fx(), max_relative = 0.02);
    assert_relative_eq!(result.extrinsics.translation.norm(), 0.1, max_relative = 0.02);
    assert!(result.extrinsics.translation.x < 0.0);
    assert!((result.extrinsics.rotation - rig.rotation).amax() < 0.01);
    assert_eq!(calibration.per_view_rms.len(), 6);
    assert!(calibration.report.final_rms() < 0.5, "rms {}", calibration.report.final_rms());
}

#[test]
fn rectified_capture_keeps_its_layout() {
    let size = ImageSize::new(96, 64);
    let joined = pipeline::rectify_side_by_side(&capture(96, 64, 12), &parallel_rig(size), &small_config())
        .expect("rectify");
    assert_eq!(joined.size(), ImageSize::new(192, 64));
}

#[test]
fn calibration_for_another_size_fails_fast() {
    let err = pipeline::reconstruct_dense(
        &capture(96, 64, 12),
        &parallel_rig(ImageSize::new(640, 480)),
        &small_config(),
    )
    .expect_err("shape mismatch");
    assert!(matches!(err, PipelineError::Rectify(_)));
}

#[test]
fn dense_reconstruction_of_a_plane() {
    init_logs();
    let size = ImageSize::new(96, 64);
    let dense = pipeline::reconstruct_dense(&capture(96, 64, 12), &parallel_rig(size), &small_config())
        .expect("dense");

    assert!(dense.disparity.valid_count() > 1000);
    assert_eq!(dense.points.len(), dense.disparity.valid_count());
    // Z = f * B / d with d in [11.5, 12.5].
    for p in &dense.points {
        assert!(p.z > 400.0 * 0.1 / 12.5 - 1e-9 && p.z < 400.0 * 0.1 / 11.5 + 1e-9, "{p:?}");
    }
}

#[test]
fn minimum_disparity_filters_dense_points() {
    let size = ImageSize::new(96, 64);
    let dense = pipeline::reconstruct_dense(&capture(96, 64, 6), &parallel_rig(size), &small_config())
        .expect("dense");
    assert!(dense.disparity.valid_count() > 0);
    assert!(dense.points.is_empty());
}

/// Random grey levels on 5x5 cells, rich in keypoints.
fn blocks(width: usize, height: usize) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let cx = ((x / 5) as u32).wrapping_mul(73_856_093);
        let cy = ((y / 5) as u32).wrapping_mul(19_349_663);
        ((cx ^ cy).wrapping_mul(2_654_435_761) >> 24) as u8
    })
}

fn keypoint_capture(dx: usize, dy: usize) -> GrayImage {
    let (w, h) = (160, 120);
    let base = blocks(w + dx, h + dy);
    ImagePair {
        left: GrayImage::from_fn(w, h, |x, y| base.get(x, y)),
        right: GrayImage::from_fn(w, h, |x, y| base.get(x + dx, y + dy)),
    }
    .to_side_by_side()
}

#[test]
fn sparse_reconstruction_of_a_plane() {
    init_logs();
    let rig = parallel_rig(ImageSize::new(160, 120));
    let sparse = pipeline::reconstruct_sparse(&keypoint_capture(10, 0), &rig, &PipelineConfig::default())
        .expect("sparse");

    let kept = sparse.correspondences.kept.len();
    assert!(kept >= 10, "kept {kept}");
    assert!(kept > sparse.correspondences.discarded.len());
    assert!(sparse.points.len() <= kept);

    // Z = f * B / d = 4 at d = 10.
    let on_plane = sparse
        .points
        .iter()
        .filter(|p| p.z > 40.0 / 11.5 && p.z < 40.0 / 8.5)
        .count();
    assert!(on_plane >= 10 && on_plane * 3 >= kept, "{on_plane} of {kept}");
}

#[test]
fn sparse_matches_off_the_scanline_are_discarded() {
    let rig = parallel_rig(ImageSize::new(160, 120));
    let sparse = pipeline::reconstruct_sparse(&keypoint_capture(10, 12), &rig, &PipelineConfig::default())
        .expect("sparse");
    assert!(sparse.correspondences.discarded.len() > sparse.correspondences.kept.len());
    assert!(sparse.points.len() <= sparse.correspondences.kept.len());
}
