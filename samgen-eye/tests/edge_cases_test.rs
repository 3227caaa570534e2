//! Edge cases: degenerate images and out-of-range parameters

mod common;

use common::{save, two_squares, ColorPredictor};
use image::{Rgb, RgbImage};
use samgen_eye::image_io::resize_to_width;
use samgen_eye::{PredictionParams, SegmentConfig, SegmentError, SegmentPredictor};
use tempfile::TempDir;

fn predictor_in(dir: &std::path::Path) -> SegmentPredictor {
    let mut config = SegmentConfig::default();
    config.output_dir = dir.join("output_masks");
    SegmentPredictor::with_model(config, Box::new(ColorPredictor::new()))
}

#[test]
fn test_single_pixel_image() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(
        &RgbImage::from_pixel(1, 1, Rgb([5, 5, 5])),
        temp_dir.path(),
        "dot.png",
    );
    let predictor = predictor_in(temp_dir.path());

    let params = PredictionParams {
        resize_width: 1,
        points_per_side: 1,
        ..PredictionParams::default()
    };
    let paths = predictor.predict(&input, &params).unwrap();

    assert_eq!(paths.len(), 1);
    let mask = image::open(&paths[0]).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (1, 1));
    assert_eq!(mask.get_pixel(0, 0).0, [255]);
}

#[test]
fn test_single_point_grid_hits_center() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(&two_squares(), temp_dir.path(), "squares.png");
    let predictor = predictor_in(temp_dir.path());

    let params = PredictionParams {
        resize_width: 64,
        points_per_side: 1,
        ..PredictionParams::default()
    };
    let annotations = predictor.generate(&input, &params).unwrap();

    // the center (32, 24) is background
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].point_coords, (32.0, 24.0));
    assert_eq!(annotations[0].area, 64 * 48 - 2 * 16 * 16);
}

#[test]
fn test_resize_to_zero_height_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(
        &RgbImage::from_pixel(400, 2, Rgb([0, 0, 0])),
        temp_dir.path(),
        "strip.png",
    );
    let predictor = predictor_in(temp_dir.path());

    let params = PredictionParams {
        resize_width: 100,
        ..PredictionParams::default()
    };
    assert!(matches!(
        predictor.predict(&input, &params),
        Err(SegmentError::InvalidParameter { name: "resize_width", .. })
    ));

    let direct = resize_to_width(&RgbImage::new(400, 2), 100);
    assert!(direct.is_err());
}

#[test]
fn test_out_of_range_params_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(&two_squares(), temp_dir.path(), "squares.png");
    let predictor = predictor_in(temp_dir.path());

    let bad = [
        PredictionParams { resize_width: 0, ..PredictionParams::default() },
        PredictionParams { points_per_side: 0, ..PredictionParams::default() },
        PredictionParams { points_per_batch: 0, ..PredictionParams::default() },
        PredictionParams { stability_score_thresh: 1.5, ..PredictionParams::default() },
        PredictionParams { box_nms_thresh: -0.1, ..PredictionParams::default() },
        PredictionParams { crop_overlap_ratio: 1.0, ..PredictionParams::default() },
        PredictionParams { crop_n_points_downscale_factor: 0, ..PredictionParams::default() },
    ];

    for params in &bad {
        assert!(
            matches!(
                predictor.predict(&input, params),
                Err(SegmentError::InvalidParameter { .. })
            ),
            "params should be rejected: {:?}",
            params
        );
    }
    assert!(!temp_dir.path().join("output_masks").exists());
}

#[test]
fn test_uniform_image_gives_one_mask() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(
        &RgbImage::from_pixel(32, 32, Rgb([90, 90, 90])),
        temp_dir.path(),
        "flat.png",
    );
    let predictor = predictor_in(temp_dir.path());

    let params = PredictionParams {
        resize_width: 32,
        points_per_side: 4,
        ..PredictionParams::default()
    };
    let paths = predictor.predict(&input, &params).unwrap();

    assert_eq!(paths.len(), 1);
    let mask = image::open(&paths[0]).unwrap().to_luma8();
    assert!(mask.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn test_strict_iou_threshold_leaves_no_masks() {
    let temp_dir = TempDir::new().unwrap();
    let input = save(&two_squares(), temp_dir.path(), "squares.png");
    let predictor = predictor_in(temp_dir.path());

    let params = PredictionParams {
        resize_width: 64,
        points_per_side: 4,
        pred_iou_thresh: 0.99,
        ..PredictionParams::default()
    };
    let paths = predictor.predict(&input, &params).unwrap();

    assert!(paths.is_empty());
    assert!(temp_dir.path().join("output_masks").is_dir());
}
