//! Automatic mask generation pipeline

pub mod boxes;
pub mod generator;
pub mod grid;
pub mod mask;

pub use boxes::{nms, BoxXyxy};
pub use generator::{AutomaticMaskGenerator, MaskAnnotation};
pub use mask::{BinaryMask, RegionMode};
