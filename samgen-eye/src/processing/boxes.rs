//! Box geometry and non-maximal suppression

use serde::{Deserialize, Serialize};

/// Pixel distance under which a box edge counts as touching a crop edge
const EDGE_TOLERANCE: u32 = 20;

/// Axis-aligned box in pixel coordinates, `(x0, y0)` to `(x1, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoxXyxy {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoxXyxy {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> f64 {
        self.width() as f64 * self.height() as f64
    }

    /// Intersection over union; zero when both boxes are degenerate
    pub fn iou(&self, other: &BoxXyxy) -> f64 {
        let ix0 = self.x0.max(other.x0);
        let iy0 = self.y0.max(other.y0);
        let ix1 = self.x1.min(other.x1);
        let iy1 = self.y1.min(other.y1);

        let inter = ix1.saturating_sub(ix0) as f64 * iy1.saturating_sub(iy0) as f64;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Shift a box from crop coordinates into image coordinates
    pub fn uncrop(&self, crop: &BoxXyxy) -> BoxXyxy {
        BoxXyxy::new(
            self.x0 + crop.x0,
            self.y0 + crop.y0,
            self.x1 + crop.x0,
            self.y1 + crop.y0,
        )
    }

    /// `[x, y, width, height]`
    pub fn to_xywh(&self) -> [u32; 4] {
        [self.x0, self.y0, self.width(), self.height()]
    }

    fn coords(&self) -> [u32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// Whether a box (in crop coordinates) touches an edge of `crop` that is
/// not also an edge of `image`.
pub fn is_box_near_crop_edge(bbox: &BoxXyxy, crop: &BoxXyxy, image: &BoxXyxy) -> bool {
    let uncropped = bbox.uncrop(crop).coords();
    let crop = crop.coords();
    let image = image.coords();

    (0..4).any(|i| {
        let near_crop = uncropped[i].abs_diff(crop[i]) <= EDGE_TOLERANCE;
        let near_image = uncropped[i].abs_diff(image[i]) <= EDGE_TOLERANCE;
        near_crop && !near_image
    })
}

/// Greedy non-maximal suppression.
///
/// Returns indices of the kept boxes ordered by descending score. Boxes with
/// equal scores keep their input order.
pub fn nms(boxes: &[BoxXyxy], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && boxes[i].iou(&boxes[j]) > iou_threshold as f64 {
                suppressed[j] = true;
            }
        }
    }

    keep
}
