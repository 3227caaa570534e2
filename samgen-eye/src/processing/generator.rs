//! Automatic mask generation over a point grid and image crops

use crate::config::PredictionParams;
use crate::error::SegmentError;
use crate::models::{MaskLogits, MaskPredictor};
use crate::processing::boxes::{is_box_near_crop_edge, nms, BoxXyxy};
use crate::processing::grid::{build_all_layer_point_grids, generate_crop_boxes, CropBox};
use crate::processing::mask::{stability_score, BinaryMask, RegionMode, MASK_THRESHOLD};
use image::imageops;
use image::RgbImage;
use rayon::prelude::*;
use serde::Serialize;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info};

/// A generated mask and the metadata describing how it was found
#[derive(Debug, Clone, Serialize)]
pub struct MaskAnnotation {
    #[serde(skip)]
    pub segmentation: BinaryMask,
    /// Foreground pixel count
    pub area: usize,
    /// `[x, y, width, height]` around the mask
    pub bbox: [u32; 4],
    pub predicted_iou: f32,
    /// The prompt point that produced this mask, in image coordinates
    pub point_coords: (f32, f32),
    pub stability_score: f32,
    /// `[x, y, width, height]` of the crop the mask was generated in
    pub crop_box: [u32; 4],
}

/// Intermediate mask state; coordinates are crop-relative until uncropped
#[derive(Debug, Clone)]
struct MaskRecord {
    mask: BinaryMask,
    bbox: BoxXyxy,
    predicted_iou: f32,
    point: (f32, f32),
    stability: f32,
    crop_box: BoxXyxy,
}

impl From<MaskRecord> for MaskAnnotation {
    fn from(record: MaskRecord) -> Self {
        MaskAnnotation {
            area: record.mask.area(),
            bbox: record.bbox.to_xywh(),
            predicted_iou: record.predicted_iou,
            point_coords: record.point,
            stability_score: record.stability,
            crop_box: record.crop_box.to_xywh(),
            segmentation: record.mask,
        }
    }
}

/// Segments everything in an image by prompting the model with a grid of
/// points, then filtering and deduplicating the resulting masks.
pub struct AutomaticMaskGenerator<'a> {
    predictor: &'a mut dyn MaskPredictor,
    params: PredictionParams,
    point_grids: Vec<Vec<(f32, f32)>>,
}

impl<'a> AutomaticMaskGenerator<'a> {
    pub fn new(
        predictor: &'a mut dyn MaskPredictor,
        params: &PredictionParams,
    ) -> Result<Self, SegmentError> {
        params.validate()?;

        let point_grids = build_all_layer_point_grids(
            params.points_per_side as usize,
            params.crop_n_layers,
            params.crop_n_points_downscale_factor,
        );

        Ok(Self {
            predictor,
            params: params.clone(),
            point_grids,
        })
    }

    /// Generate masks for the whole image, ordered as the final
    /// suppression pass ranked them
    pub fn generate(&mut self, image: &RgbImage) -> Result<Vec<MaskAnnotation>, SegmentError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SegmentError::Processing(
                "Cannot generate masks for an empty image".to_string(),
            ));
        }

        let started = Instant::now();
        let crops = generate_crop_boxes(
            width,
            height,
            self.params.crop_n_layers,
            self.params.crop_overlap_ratio,
        );

        let mut records = Vec::new();
        for crop in &crops {
            records.extend(self.process_crop(image, crop)?);
        }

        if crops.len() > 1 {
            // Prefer masks from smaller crops
            let scores: Vec<f32> = records
                .iter()
                .map(|r| (1.0 / r.crop_box.area().max(1.0)) as f32)
                .collect();
            let before = records.len();
            records = suppress(records, &scores, self.params.crop_nms_thresh);
            debug!("Cross-crop NMS kept {} of {} masks", records.len(), before);
        }

        if self.params.min_mask_region_area > 0 {
            let nms_thresh = self.params.box_nms_thresh.max(self.params.crop_nms_thresh);
            records = postprocess_small_regions(
                records,
                self.params.min_mask_region_area as usize,
                nms_thresh,
            );
        }

        info!(
            "Generated {} masks over {} crop(s) in {:?}",
            records.len(),
            crops.len(),
            started.elapsed()
        );

        Ok(records.into_iter().map(MaskAnnotation::from).collect())
    }

    fn process_crop(
        &mut self,
        image: &RgbImage,
        crop: &CropBox,
    ) -> Result<Vec<MaskRecord>, SegmentError> {
        let (width, height) = image.dimensions();
        let crop_box = crop.bbox;
        let (crop_w, crop_h) = (crop_box.width(), crop_box.height());

        let points: Vec<(f32, f32)> = self
            .point_grids
            .get(crop.layer)
            .map(|grid| {
                grid.iter()
                    .map(|&(x, y)| (x * crop_w as f32, y * crop_h as f32))
                    .collect()
            })
            .unwrap_or_default();
        if points.is_empty() || crop_w == 0 || crop_h == 0 {
            return Ok(Vec::new());
        }

        let image_box = BoxXyxy::new(0, 0, width, height);
        let cropped: Cow<'_, RgbImage> = if crop_box == image_box {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(imageops::crop_imm(image, crop_box.x0, crop_box.y0, crop_w, crop_h).to_image())
        };

        self.predictor.set_image(&cropped)?;

        let batch_size = self.params.points_per_batch.max(1) as usize;
        let mut candidates = Vec::new();
        for batch in points.chunks(batch_size) {
            candidates.extend(self.process_batch(batch, &crop_box, &image_box)?);
        }

        let scores: Vec<f32> = candidates.iter().map(|r| r.predicted_iou).collect();
        let found = candidates.len();
        let kept = suppress(candidates, &scores, self.params.box_nms_thresh);

        debug!(
            "Crop {:?} (layer {}): {} points, {} candidates, {} after NMS",
            crop_box.to_xywh(),
            crop.layer,
            points.len(),
            found,
            kept.len()
        );

        let records: Vec<MaskRecord> = kept
            .into_par_iter()
            .map(|r| MaskRecord {
                mask: r.mask.uncrop(&crop_box, width, height),
                bbox: r.bbox.uncrop(&crop_box),
                point: (r.point.0 + crop_box.x0 as f32, r.point.1 + crop_box.y0 as f32),
                crop_box,
                ..r
            })
            .collect();

        Ok(records)
    }

    fn process_batch(
        &mut self,
        points: &[(f32, f32)],
        crop_box: &BoxXyxy,
        image_box: &BoxXyxy,
    ) -> Result<Vec<MaskRecord>, SegmentError> {
        let mut raw: Vec<((f32, f32), MaskLogits)> = Vec::with_capacity(points.len() * 3);
        for &point in points {
            for candidate in self.predictor.predict_point(point)? {
                raw.push((point, candidate));
            }
        }

        let (crop_w, crop_h) = (crop_box.width(), crop_box.height());
        let pred_iou_thresh = self.params.pred_iou_thresh;
        let stability_thresh = self.params.stability_score_thresh;
        let stability_offset = self.params.stability_score_offset;
        let crop_box = *crop_box;
        let image_box = *image_box;

        raw.into_par_iter()
            .filter_map(|(point, candidate)| {
                if pred_iou_thresh > 0.0 && !(candidate.predicted_iou > pred_iou_thresh) {
                    return None;
                }

                let stability = stability_score(&candidate.logits, MASK_THRESHOLD, stability_offset);
                if stability_thresh > 0.0 && !(stability > stability_thresh) {
                    return None;
                }

                let mask = match BinaryMask::from_logits(crop_w, crop_h, &candidate.logits) {
                    Some(mask) => mask,
                    None => {
                        return Some(Err(SegmentError::Model(format!(
                            "Mask has {} logits, expected {}x{}",
                            candidate.logits.len(),
                            crop_w,
                            crop_h
                        ))))
                    }
                };

                let bbox = mask.bounding_box();
                if is_box_near_crop_edge(&bbox, &crop_box, &image_box) {
                    return None;
                }

                Some(Ok(MaskRecord {
                    mask,
                    bbox,
                    predicted_iou: candidate.predicted_iou,
                    point,
                    stability,
                    crop_box,
                }))
            })
            .collect()
    }
}

/// Keep the records that survive NMS, in NMS order
fn suppress(records: Vec<MaskRecord>, scores: &[f32], iou_threshold: f32) -> Vec<MaskRecord> {
    let boxes: Vec<BoxXyxy> = records.iter().map(|r| r.bbox).collect();
    let keep = nms(&boxes, scores, iou_threshold);

    let mut slots: Vec<Option<MaskRecord>> = records.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Fill small holes and drop small islands, then deduplicate again.
/// Masks left untouched outrank masks that were edited.
fn postprocess_small_regions(
    records: Vec<MaskRecord>,
    min_area: usize,
    nms_thresh: f32,
) -> Vec<MaskRecord> {
    if records.is_empty() {
        return records;
    }

    let (cleaned, scores): (Vec<MaskRecord>, Vec<f32>) = records
        .into_par_iter()
        .map(|mut record| {
            let (mask, filled) = record.mask.remove_small_regions(min_area, RegionMode::Holes);
            let (mask, trimmed) = mask.remove_small_regions(min_area, RegionMode::Islands);
            let unchanged = !filled && !trimmed;
            if !unchanged {
                record.bbox = mask.bounding_box();
                record.mask = mask;
            }
            (record, if unchanged { 1.0 } else { 0.0 })
        })
        .unzip();

    let before = cleaned.len();
    let kept = suppress(cleaned, &scores, nms_thresh);
    debug!("Small-region cleanup kept {} of {} masks", kept.len(), before);
    kept
}
