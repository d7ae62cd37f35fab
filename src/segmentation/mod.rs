//! # Character Segmentation Module
//!
//! This module turns a labeled CAPTCHA image into per-character binary
//! crops for classifier training. It is organized into focused
//! sub-modules:
//! - `denoising`: local-neighborhood removal of interference-line pixels
//! - `binarization`: fixed-threshold inversion, closing, and dilation masks
//! - `contours`: connected-component contour tokenizer
//! - `watershed`: distance-transform seeded watershed tokenizer
//! - `projection`: column-profile tokenizer
//! - `reconciler`: adaptive dilation/stride sweep and split fallback
//! - `cropping`: canonical-resolution character extraction
//! - `types`: shared types and error definitions

pub mod binarization;
pub mod contours;
pub mod cropping;
pub mod denoising;
pub mod projection;
pub mod reconciler;
pub mod types;
pub mod watershed;

// Re-export commonly used types and functions for convenience
pub use types::{
    BinarizedImageResult, BoundingBox, CharacterCrop, DenoisedImageResult,
    ReconciledSegmentation, Segment, SegmentationError, Strategy,
};

// Re-export main functions from sub-modules
pub use binarization::{binarize, dilate_mask, BINARY_THRESHOLD};
pub use contours::tokenize_contours;
pub use cropping::{crop_characters, CANONICAL_CHAR_SIZE};
pub use denoising::denoise;
pub use projection::tokenize_projection;
pub use reconciler::{
    reconcile, split_to_match, DILATION_SEARCH_STEPS, PROJECTION_MAX_STEP, PROJECTION_MIN_STEP,
};
pub use watershed::tokenize_watershed;
