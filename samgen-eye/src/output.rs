//! Writing generated masks to disk

use crate::error::SegmentError;
use crate::processing::MaskAnnotation;
use image::GrayImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the optional metadata file written next to the masks
pub const MANIFEST_NAME: &str = "masks.json";

#[derive(Serialize)]
struct ManifestEntry<'a> {
    file: String,
    #[serde(flatten)]
    annotation: &'a MaskAnnotation,
}

/// Writes masks as white-on-black images into one directory
pub struct MaskWriter {
    dir: PathBuf,
    write_manifest: bool,
}

impl MaskWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_manifest: false,
        }
    }

    pub fn with_manifest(mut self, enabled: bool) -> Self {
        self.write_manifest = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `mask_{idx}.png` per annotation and return the paths in order
    pub fn write_all(&self, annotations: &[MaskAnnotation]) -> Result<Vec<PathBuf>, SegmentError> {
        fs::create_dir_all(&self.dir)?;

        let mut paths = Vec::with_capacity(annotations.len());
        for (idx, annotation) in annotations.iter().enumerate() {
            let path = self.dir.join(format!("mask_{}.png", idx));
            render_mask(annotation)?.save(&path)?;
            debug!("Wrote {:?} (area {})", path, annotation.area);
            paths.push(path);
        }

        if self.write_manifest {
            self.write_manifest_file(annotations, &paths)?;
        }

        info!("Wrote {} mask(s) to {:?}", paths.len(), self.dir);
        Ok(paths)
    }

    fn write_manifest_file(
        &self,
        annotations: &[MaskAnnotation],
        paths: &[PathBuf],
    ) -> Result<(), SegmentError> {
        let entries: Vec<ManifestEntry<'_>> = annotations
            .iter()
            .zip(paths)
            .map(|(annotation, path)| ManifestEntry {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                annotation,
            })
            .collect();

        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(self.dir.join(MANIFEST_NAME), json)?;
        Ok(())
    }
}

/// 255 where the mask is set, 0 elsewhere
pub fn render_mask(annotation: &MaskAnnotation) -> Result<GrayImage, SegmentError> {
    let mask = &annotation.segmentation;
    let pixels = mask.bits().iter().map(|&b| if b { 255 } else { 0 }).collect();
    GrayImage::from_raw(mask.width(), mask.height(), pixels)
        .ok_or_else(|| SegmentError::Processing("Mask buffer does not match its size".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::BinaryMask;
    use tempfile::TempDir;

    fn annotation(width: u32, height: u32, on: &[(u32, u32)]) -> MaskAnnotation {
        let mut bits = vec![false; (width * height) as usize];
        for &(x, y) in on {
            bits[(y * width + x) as usize] = true;
        }
        let segmentation = BinaryMask::from_bits(width, height, bits).unwrap();
        MaskAnnotation {
            area: segmentation.area(),
            bbox: segmentation.bounding_box().to_xywh(),
            segmentation,
            predicted_iou: 0.9,
            point_coords: (1.0, 1.0),
            stability_score: 0.97,
            crop_box: [0, 0, width, height],
        }
    }

    #[test]
    fn test_render_mask_is_white_on_black() {
        let img = render_mask(&annotation(3, 2, &[(1, 0), (2, 1)])).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(1, 0).0, [255]);
        assert_eq!(img.get_pixel(2, 1).0, [255]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn test_write_all_creates_dir_and_names_files() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("output_masks");
        let writer = MaskWriter::new(&out);

        let paths = writer
            .write_all(&[annotation(4, 4, &[(0, 0)]), annotation(4, 4, &[(3, 3)])])
            .unwrap();

        assert_eq!(paths, vec![out.join("mask_0.png"), out.join("mask_1.png")]);
        for path in &paths {
            assert!(path.exists());
        }
        assert!(!out.join(MANIFEST_NAME).exists());

        let second = image::open(&paths[1]).unwrap().to_luma8();
        assert_eq!(second.get_pixel(3, 3).0, [255]);
        assert_eq!(second.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn test_write_all_empty_still_creates_dir() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("empty");
        let paths = MaskWriter::new(&out).write_all(&[]).unwrap();
        assert!(paths.is_empty());
        assert!(out.is_dir());
    }

    #[test]
    fn test_manifest_lists_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let writer = MaskWriter::new(temp_dir.path()).with_manifest(true);
        writer.write_all(&[annotation(4, 4, &[(1, 1), (2, 2)])]).unwrap();

        let content = fs::read_to_string(temp_dir.path().join(MANIFEST_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let entry = &value[0];
        assert_eq!(entry["file"], "mask_0.png");
        assert_eq!(entry["area"], 2);
        assert_eq!(entry["bbox"], serde_json::json!([1, 1, 1, 1]));
        assert!(entry.get("segmentation").is_none());
    }
}
