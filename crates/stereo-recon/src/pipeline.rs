//! End-to-end stages over in-memory side-by-side images.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use log::{info, warn};
use nalgebra::Point3;
use rayon::prelude::*;
use stereo_recon_calib::{StereoCalibration, StereoCalibrator, StereoView};
use stereo_recon_chessboard::PatternDetector;
use stereo_recon_cloud::Triangulator;
use stereo_recon_core::{CalibrationResult, GrayImage, ImagePair, ImageSize};
use stereo_recon_match::{
    DenseMatcher, DisparityMap, SparseCorrespondences, SparseMatcher, StereoMatcher,
};
use stereo_recon_rectify::{RectificationEngine, RectifiedGeometry};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Board detections of a calibration batch.
#[derive(Clone, Debug)]
pub struct DetectedViews {
    /// Pairs where both halves saw the board, in input order.
    pub views: Vec<StereoView>,
    /// Size of one half. `None` when no image could be split.
    pub image_size: Option<ImageSize>,
    /// Input indices of images that were skipped, ascending.
    pub skipped: Vec<usize>,
}

/// Split every side-by-side image and detect the board on both halves.
///
/// Pairs are detected in parallel. The first image that splits fixes the
/// calibration size. A miss on either half, an image that cannot be split,
/// or one whose halves have another size only skips that image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(images, config), fields(images = images.len()))
)]
pub fn detect_views(images: &[GrayImage], config: &PipelineConfig) -> DetectedViews {
    let detector = PatternDetector::new(config.pattern, config.chessboard.clone());
    let mut image_size: Option<ImageSize> = None;
    let mut pairs = Vec::with_capacity(images.len());
    let mut skipped = Vec::new();
    for (index, img) in images.iter().enumerate() {
        let pair = match ImagePair::split_side_by_side(&img.view()) {
            Ok(pair) => pair,
            Err(err) => {
                warn!("image {index}: {err}, skipping");
                skipped.push(index);
                continue;
            }
        };
        let expected = *image_size.get_or_insert(pair.size());
        if pair.size() != expected {
            warn!(
                "image {index}: halves are {}, expected {expected}, skipping",
                pair.size()
            );
            skipped.push(index);
            continue;
        }
        pairs.push((index, pair));
    }

    let detections: Vec<(usize, Option<StereoView>)> = pairs
        .par_iter()
        .map(|(index, pair)| {
            let (left, right) = rayon::join(
                || detector.detect(&pair.left.view()),
                || detector.detect(&pair.right.view()),
            );
            let view = match (left, right) {
                (Some(l), Some(r)) => Some(StereoView::new(&config.pattern, l, r)),
                (l, r) => {
                    let side = match (l.is_some(), r.is_some()) {
                        (false, false) => "either half",
                        (true, false) => "the right half",
                        _ => "the left half",
                    };
                    warn!("pair {index}: pattern not found in {side}, skipping");
                    None
                }
            };
            (*index, view)
        })
        .collect();

    let mut views = Vec::new();
    for (index, view) in detections {
        match view {
            Some(v) => views.push(v),
            None => skipped.push(index),
        }
    }
    skipped.sort_unstable();
    info!(
        "pattern found on both halves of {} of {} images",
        views.len(),
        images.len()
    );
    DetectedViews {
        views,
        image_size,
        skipped,
    }
}

/// Detect the board in every image and calibrate the rig.
///
/// Unusable images are skipped with a warning. Fails with
/// [`stereo_recon_calib::CalibrationError::NoValidPairs`] when no pair has a
/// detection on both halves.
pub fn calibrate_images(
    images: &[GrayImage],
    config: &PipelineConfig,
) -> Result<StereoCalibration, PipelineError> {
    let detected = detect_views(images, config);
    let size = detected.image_size.unwrap_or(ImageSize::new(0, 0));
    let calibration =
        StereoCalibrator::new(config.calibration.clone()).calibrate(&detected.views, size)?;
    Ok(calibration)
}

/// Split a side-by-side capture and rectify both halves.
pub fn rectify_image(
    side_by_side: &GrayImage,
    calib: &CalibrationResult,
    config: &PipelineConfig,
) -> Result<(ImagePair, RectifiedGeometry), PipelineError> {
    let pair = ImagePair::split_side_by_side(&side_by_side.view())?;
    let engine = RectificationEngine::new(calib, pair.size(), &config.rectify)?;
    Ok((engine.apply(&pair)?, engine.geometry()))
}

/// Rectified halves joined side by side again, for visual inspection.
pub fn rectify_side_by_side(
    side_by_side: &GrayImage,
    calib: &CalibrationResult,
    config: &PipelineConfig,
) -> Result<GrayImage, PipelineError> {
    let (pair, _) = rectify_image(side_by_side, calib, config)?;
    Ok(pair.to_side_by_side())
}

#[derive(Clone, Debug)]
pub struct DenseReconstruction {
    pub rectified: ImagePair,
    pub disparity: DisparityMap,
    /// Points in left-image scan order.
    pub points: Vec<Point3<f64>>,
}

/// Rectify, block-match and triangulate one side-by-side capture.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn reconstruct_dense(
    side_by_side: &GrayImage,
    calib: &CalibrationResult,
    config: &PipelineConfig,
) -> Result<DenseReconstruction, PipelineError> {
    let (rectified, geometry) = rectify_image(side_by_side, calib, config)?;
    let disparity = DenseMatcher::new(config.dense.clone())?.match_pair(&rectified)?;
    let triangulator = Triangulator::from_geometry(&geometry, &config.dense_triangulation)?;
    let points: Vec<_> = triangulator.points(&disparity).collect();
    info!(
        "dense: {} matched pixels, {} points",
        disparity.valid_count(),
        points.len()
    );
    Ok(DenseReconstruction {
        rectified,
        disparity,
        points,
    })
}

#[derive(Clone, Debug)]
pub struct SparseReconstruction {
    pub correspondences: SparseCorrespondences,
    /// Points in the order of the kept matches.
    pub points: Vec<Point3<f64>>,
}

/// Rectify, match keypoints and triangulate one side-by-side capture.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn reconstruct_sparse(
    side_by_side: &GrayImage,
    calib: &CalibrationResult,
    config: &PipelineConfig,
) -> Result<SparseReconstruction, PipelineError> {
    let (rectified, geometry) = rectify_image(side_by_side, calib, config)?;
    let correspondences = SparseMatcher::new(config.sparse.clone())?.match_pair(&rectified)?;
    let triangulator = Triangulator::from_geometry(&geometry, &config.sparse_triangulation)?;
    let points: Vec<_> = triangulator.points(&correspondences).collect();
    info!(
        "sparse: {} matches kept, {} discarded, {} points",
        correspondences.kept.len(),
        correspondences.discarded.len(),
        points.len()
    );
    Ok(SparseReconstruction {
        correspondences,
        points,
    })
}
