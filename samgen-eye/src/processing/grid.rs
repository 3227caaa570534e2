//! Point grids and crop boxes for automatic mask generation

use crate::processing::boxes::BoxXyxy;

/// Evenly spaced `n x n` grid in normalized [0, 1] coordinates.
///
/// Points are ordered row by row with x varying fastest.
pub fn build_point_grid(n_per_side: usize) -> Vec<(f32, f32)> {
    if n_per_side == 0 {
        return Vec::new();
    }

    let offset = 1.0 / (2.0 * n_per_side as f64);
    let axis = linspace(offset, 1.0 - offset, n_per_side);

    let mut points = Vec::with_capacity(n_per_side * n_per_side);
    for &y in &axis {
        for &x in &axis {
            points.push((x as f32, y as f32));
        }
    }
    points
}

/// Point grids for every crop layer, layer `i` having `n / scale^i` points per side
pub fn build_all_layer_point_grids(
    n_per_side: usize,
    n_layers: u32,
    scale_per_layer: u32,
) -> Vec<Vec<(f32, f32)>> {
    (0..=n_layers)
        .map(|i| {
            let divisor = (scale_per_layer.max(1) as f64).powi(i as i32);
            let n_points = (n_per_side as f64 / divisor) as usize;
            build_point_grid(n_points)
        })
        .collect()
}

/// A region of the image processed as its own inference pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub bbox: BoxXyxy,
    pub layer: usize,
}

/// Crop boxes for `n_layers` extra layers on top of the full image.
///
/// Layer `i` splits the image into `2^i` crops per side, overlapping by a
/// share of the short side that shrinks as the crops get smaller.
pub fn generate_crop_boxes(
    width: u32,
    height: u32,
    n_layers: u32,
    overlap_ratio: f32,
) -> Vec<CropBox> {
    let mut crops = vec![CropBox {
        bbox: BoxXyxy::new(0, 0, width, height),
        layer: 0,
    }];

    let short_side = width.min(height) as f64;

    for i_layer in 0..n_layers {
        let n_crops_per_side = 1u32 << (i_layer + 1);
        let overlap =
            (overlap_ratio as f64 * short_side * (2.0 / n_crops_per_side as f64)) as u32;

        let crop_w = crop_len(width, n_crops_per_side, overlap);
        let crop_h = crop_len(height, n_crops_per_side, overlap);

        let x0s: Vec<u32> = (0..n_crops_per_side)
            .map(|i| crop_w.saturating_sub(overlap) * i)
            .collect();
        let y0s: Vec<u32> = (0..n_crops_per_side)
            .map(|i| crop_h.saturating_sub(overlap) * i)
            .collect();

        for &x0 in &x0s {
            for &y0 in &y0s {
                crops.push(CropBox {
                    bbox: BoxXyxy::new(
                        x0,
                        y0,
                        (x0 + crop_w).min(width),
                        (y0 + crop_h).min(height),
                    ),
                    layer: i_layer as usize + 1,
                });
            }
        }
    }

    crops
}

fn crop_len(orig_len: u32, n_crops: u32, overlap: u32) -> u32 {
    let total = overlap as f64 * (n_crops - 1) as f64 + orig_len as f64;
    (total / n_crops as f64).ceil() as u32
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_grid_single_point_is_center() {
        assert_eq!(build_point_grid(1), vec![(0.5, 0.5)]);
    }

    #[test]
    fn test_point_grid_order_and_spacing() {
        let grid = build_point_grid(2);
        assert_eq!(grid, vec![(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)]);
    }

    #[test]
    fn test_point_grid_stays_inside_unit_square() {
        let grid = build_point_grid(32);
        assert_eq!(grid.len(), 1024);
        for (x, y) in grid {
            assert!(x > 0.0 && x < 1.0);
            assert!(y > 0.0 && y < 1.0);
        }
    }

    #[test]
    fn test_point_grid_empty() {
        assert!(build_point_grid(0).is_empty());
    }

    #[test]
    fn test_layer_grids_downscale() {
        let grids = build_all_layer_point_grids(32, 2, 2);
        assert_eq!(grids.len(), 3);
        assert_eq!(grids[0].len(), 32 * 32);
        assert_eq!(grids[1].len(), 16 * 16);
        assert_eq!(grids[2].len(), 8 * 8);
    }

    #[test]
    fn test_layer_grids_without_downscale() {
        let grids = build_all_layer_point_grids(4, 1, 1);
        assert_eq!(grids[0], grids[1]);
    }

    #[test]
    fn test_crop_boxes_no_layers() {
        let crops = generate_crop_boxes(640, 480, 0, 0.5);
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].bbox, BoxXyxy::new(0, 0, 640, 480));
        assert_eq!(crops[0].layer, 0);
    }

    #[test]
    fn test_crop_boxes_one_layer() {
        // short side 100, overlap = int(0.2 * 100 * 1) = 20, crop = ceil((20 + 100) / 2) = 60
        let crops = generate_crop_boxes(100, 100, 1, 0.2);
        assert_eq!(crops.len(), 5);
        let expected = [
            BoxXyxy::new(0, 0, 60, 60),
            BoxXyxy::new(0, 40, 60, 100),
            BoxXyxy::new(40, 0, 100, 60),
            BoxXyxy::new(40, 40, 100, 100),
        ];
        for (crop, want) in crops[1..].iter().zip(expected.iter()) {
            assert_eq!(crop.bbox, *want);
            assert_eq!(crop.layer, 1);
        }
    }

    #[test]
    fn test_crop_boxes_two_layers_count_and_bounds() {
        let crops = generate_crop_boxes(300, 200, 2, 512.0 / 1500.0);
        assert_eq!(crops.len(), 1 + 4 + 16);
        for crop in &crops {
            assert!(crop.bbox.x1 <= 300);
            assert!(crop.bbox.y1 <= 200);
            assert!(crop.bbox.x0 < crop.bbox.x1);
            assert!(crop.bbox.y0 < crop.bbox.y1);
        }
        assert_eq!(crops.iter().filter(|c| c.layer == 2).count(), 16);
    }
}
