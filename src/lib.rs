//! # Captcha Slicer
//!
//! Splits labeled CAPTCHA images into per-character training crops for a
//! character classifier. The hard part is character segmentation under
//! noise: interference lines, speckle, touching glyphs, and no reliable
//! global threshold. The pipeline denoises and binarizes each image, then
//! drives one of three tokenization strategies (contours, projection
//! profile, watershed) through an adaptive dilation sweep until the box
//! count matches the ground-truth label length, bisecting oversized
//! segments as a last resort. Samples that cannot be reconciled are
//! dropped rather than emitted wrong.

pub mod config;
pub mod dataset;
pub mod segmentation;

// Re-export types for easier access
pub use config::SlicerConfig;
pub use dataset::{BatchReport, CharacterFrequencyCounter, LabeledSample};
pub use segmentation::{Segment, SegmentationError, Strategy};
