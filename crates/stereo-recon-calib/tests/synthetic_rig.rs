use approx::assert_relative_eq;
use nalgebra::{Point3, Rotation3, Vector3};
use stereo_recon_calib::{CalibrationError, CalibrationParams, StereoCalibrator, StereoView};
use stereo_recon_core::{CameraIntrinsics, CornerSet, Distortion, ImageSize, Pattern};

struct Rig {
    left: CameraIntrinsics,
    right: CameraIntrinsics,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

fn ground_truth() -> Rig {
    Rig {
        left: CameraIntrinsics::new(800.0, 805.0, 322.0, 241.0, Distortion::default()),
        right: CameraIntrinsics::new(810.0, 812.0, 318.0, 237.5, Distortion::default()),
        rotation: Rotation3::from_euler_angles(0.01, -0.02, 0.005),
        translation: Vector3::new(-0.1, 0.001, 0.002),
    }
}

/// Board poses spread over tilt directions and distances, centred roughly on
/// the optical axis.
fn board_views(rig: &Rig, pattern: &Pattern) -> Vec<StereoView> {
    let centre = Vector3::new(
        (pattern.cols - 1) as f64 * pattern.square_size * 0.5,
        (pattern.rows - 1) as f64 * pattern.square_size * 0.5,
        0.0,
    );
    let poses = [
        ((0.3, 0.0, 0.0), (0.05, 0.0, 0.6)),
        ((-0.3, 0.1, 0.1), (0.04, 0.01, 0.65)),
        ((0.0, 0.35, -0.05), (0.06, -0.01, 0.7)),
        ((0.1, -0.35, 0.2), (0.05, 0.02, 0.55)),
        ((0.25, 0.25, -0.3), (0.03, 0.0, 0.8)),
        ((-0.2, -0.25, 0.4), (0.07, -0.02, 0.5)),
    ];

    let object = pattern.object_points();
    poses
        .iter()
        .map(|&((roll, pitch, yaw), (tx, ty, tz))| {
            let r = Rotation3::from_euler_angles(roll, pitch, yaw);
            let t = Vector3::new(tx, ty, tz) - r * centre;
            let mut left = Vec::new();
            let mut right = Vec::new();
            for p in &object {
                let pl = r * p.coords + t;
                let pr = rig.rotation * pl + rig.translation;
                left.push(rig.left.project(&Point3::from(pl)).expect("left in front"));
                right.push(rig.right.project(&Point3::from(pr)).expect("right in front"));
            }
            StereoView::new(
                pattern,
                CornerSet {
                    cols: pattern.cols,
                    rows: pattern.rows,
                    points: left,
                },
                CornerSet {
                    cols: pattern.cols,
                    rows: pattern.rows,
                    points: right,
                },
            )
        })
        .collect()
}

fn tight() -> CalibrationParams {
    CalibrationParams {
        max_iterations: 100,
        epsilon: 1e-12,
        ..CalibrationParams::default()
    }
}

#[test]
fn recovers_synthetic_rig() {
    let rig = ground_truth();
    let pattern = Pattern::new(7, 5, 0.03);
    let views = board_views(&rig, &pattern);

    let calib = StereoCalibrator::new(tight())
        .calibrate(&views, ImageSize::new(640, 480))
        .expect("calibration");
    let result = &calib.result;

    assert_relative_eq!(result.left.fx(), rig.left.fx(), max_relative = 5e-3);
    assert_relative_eq!(result.left.fy(), rig.left.fy(), max_relative = 5e-3);
    assert_relative_eq!(result.right.fx(), rig.right.fx(), max_relative = 5e-3);
    assert!((result.extrinsics.translation - rig.translation).norm() < 1e-3);
    assert!((result.extrinsics.rotation - rig.rotation.matrix()).amax() < 1e-3);

    let rms = result.rms.expect("rms");
    assert!(rms < 1e-3, "rms {rms}");
    assert_eq!(calib.per_view_rms.len(), views.len());
    assert!(calib.report.final_cost <= calib.report.initial_cost);
    assert_eq!(result.image_size, Some(ImageSize::new(640, 480)));
}

#[test]
fn fixed_terms_stay_zero() {
    let rig = ground_truth();
    let pattern = Pattern::new(7, 5, 0.03);
    let views = board_views(&rig, &pattern);
    let params = CalibrationParams {
        fix_k3: true,
        zero_tangent: true,
        ..tight()
    };

    let calib = StereoCalibrator::new(params)
        .calibrate(&views, ImageSize::new(640, 480))
        .expect("calibration");
    for cam in [&calib.result.left, &calib.result.right] {
        assert!(cam.distortion.p1.abs() < 1e-12);
        assert!(cam.distortion.p2.abs() < 1e-12);
        assert!(cam.distortion.k3.abs() < 1e-12);
    }
    assert!(calib.result.rms.unwrap_or(f64::INFINITY) < 1e-3);
}

#[test]
fn zero_views_fail_without_a_result() {
    let err = StereoCalibrator::default()
        .calibrate(&[], ImageSize::new(640, 480))
        .expect_err("no pairs");
    assert!(matches!(err, CalibrationError::NoValidPairs));
}
