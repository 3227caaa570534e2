//! Binary masks and the pixel-level operations run on them

use crate::processing::boxes::BoxXyxy;

/// Logit cutoff separating foreground from background
pub const MASK_THRESHOLD: f32 = 0.0;

/// Which kind of small region `remove_small_regions` cleans up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionMode {
    /// Fill background components enclosed by or adjacent to the mask
    Holes,
    /// Drop disconnected foreground components
    Islands,
}

/// Row-major boolean mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// All-background mask
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask from row-major bits; `None` when the length does not match
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        if bits.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            bits,
        })
    }

    /// Binarize logits at [`MASK_THRESHOLD`]
    pub fn from_logits(width: u32, height: u32, logits: &[f32]) -> Option<Self> {
        let bits = logits.iter().map(|&v| v > MASK_THRESHOLD).collect();
        Self::from_bits(width, height, bits)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Number of foreground pixels
    pub fn area(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Tight box around the foreground with inclusive max coordinates.
    /// An empty mask yields the all-zero box.
    pub fn bounding_box(&self) -> BoxXyxy {
        let w = self.width as usize;
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;

        for (idx, _) in self.bits.iter().enumerate().filter(|(_, b)| **b) {
            let x = (idx % w) as u32;
            let y = (idx / w) as u32;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            any = true;
        }

        if !any {
            return BoxXyxy::default();
        }
        BoxXyxy::new(min_x, min_y, max_x, max_y)
    }

    /// Place this crop-sized mask into a `width x height` canvas at the crop offset
    pub fn uncrop(&self, crop: &BoxXyxy, width: u32, height: u32) -> BinaryMask {
        if crop.x0 == 0 && crop.y0 == 0 && self.width == width && self.height == height {
            return self.clone();
        }

        let mut out = BinaryMask::empty(width, height);
        let copy_w = self.width.min(width.saturating_sub(crop.x0)) as usize;
        let copy_h = self.height.min(height.saturating_sub(crop.y0));

        for y in 0..copy_h {
            let src = y as usize * self.width as usize;
            let dst = (y + crop.y0) as usize * width as usize + crop.x0 as usize;
            out.bits[dst..dst + copy_w].copy_from_slice(&self.bits[src..src + copy_w]);
        }
        out
    }

    /// Fill small holes or drop small islands.
    ///
    /// Returns the cleaned mask and whether anything changed. In island mode
    /// the largest component survives even when every component is small.
    pub fn remove_small_regions(&self, area_thresh: usize, mode: RegionMode) -> (BinaryMask, bool) {
        let correct_holes = mode == RegionMode::Holes;
        let working: Vec<bool> = self.bits.iter().map(|&b| b ^ correct_holes).collect();
        let (labels, sizes) = connected_components(&working, self.width, self.height);

        let small: Vec<usize> = sizes
            .iter()
            .enumerate()
            .filter(|(_, s)| **s < area_thresh)
            .map(|(i, _)| i + 1)
            .collect();
        if small.is_empty() {
            return (self.clone(), false);
        }

        let n_labels = sizes.len() + 1;
        let mut fill = vec![false; n_labels];
        fill[0] = true;
        for &label in &small {
            fill[label] = true;
        }

        if !correct_holes {
            for f in fill.iter_mut() {
                *f = !*f;
            }
            if !fill.iter().any(|&f| f) {
                let largest = sizes
                    .iter()
                    .enumerate()
                    .fold((0usize, 0usize), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
                    .0;
                fill[largest + 1] = true;
            }
        }

        let bits = labels.iter().map(|&l| fill[l as usize]).collect();
        (
            BinaryMask {
                width: self.width,
                height: self.height,
                bits,
            },
            true,
        )
    }
}

/// Ratio of masks binarized at `threshold + offset` and `threshold - offset`.
///
/// High values mean the mask barely moves when the cutoff shifts. Returns 0
/// when the looser mask is empty.
pub fn stability_score(logits: &[f32], threshold: f32, offset: f32) -> f32 {
    let high = threshold + offset;
    let low = threshold - offset;

    let (intersections, unions) = logits.iter().fold((0u64, 0u64), |(i, u), &v| {
        (i + (v > high) as u64, u + (v > low) as u64)
    });

    if unions == 0 {
        return 0.0;
    }
    intersections as f32 / unions as f32
}

/// 8-connected component labelling of the `true` pixels.
///
/// Label 0 is background; `sizes[i]` is the pixel count of label `i + 1`.
pub fn connected_components(bits: &[bool], width: u32, height: u32) -> (Vec<u32>, Vec<usize>) {
    let w = width as i64;
    let h = height as i64;
    let mut labels = vec![0u32; bits.len()];
    let mut sizes = Vec::new();
    let mut stack = Vec::new();

    for start in 0..bits.len() {
        if !bits[start] || labels[start] != 0 {
            continue;
        }

        let label = sizes.len() as u32 + 1;
        let mut size = 0usize;
        labels[start] = label;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            size += 1;
            let x = idx as i64 % w;
            let y = idx as i64 / w;

            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let n = (ny * w + nx) as usize;
                    if bits[n] && labels[n] == 0 {
                        labels[n] = label;
                        stack.push(n);
                    }
                }
            }
        }

        sizes.push(size);
    }

    (labels, sizes)
}
