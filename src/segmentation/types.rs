//! # Shared Types for Character Segmentation
//!
//! This module contains the shared types, structs, and enums used across
//! the segmentation sub-modules.

use image::GrayImage;

/// Errors that can occur during character segmentation operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationError {
    /// Final box count does not match the expected character count.
    /// Covers empty tokenizer output and exhausted split attempts as well,
    /// since both resolve to a count that cannot be reconciled.
    CountMismatch { expected: usize, actual: usize },
    /// Failed to load or decode an input image
    ImageLoad { message: String },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentationError::CountMismatch { expected, actual } => {
                write!(
                    f,
                    "Segment count mismatch: expected {} characters, got {} boxes",
                    expected, actual
                )
            }
            SegmentationError::ImageLoad { message } => {
                write!(f, "Failed to load image: {}", message)
            }
            SegmentationError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for SegmentationError {}

/// An axis-aligned rectangular region of an image, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Left edge (column) of the box
    pub x: u32,
    /// Top edge (row) of the box
    pub y: u32,
    /// Box width in pixels (always > 0)
    pub width: u32,
    /// Box height in pixels (always > 0)
    pub height: u32,
}

impl BoundingBox {
    /// Creates a new bounding box from origin and extent.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bounding-box area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// One past the right edge of the box.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom edge of the box.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// A candidate character region produced by a tokenizer.
///
/// The `splittable` flag records whether the box came from a strategy that
/// supports recursive bisection (projection profiles) or from one that does
/// not (contours, watershed). A non-splittable segment is never bisected by
/// the reconciler's fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// The region this segment covers
    pub bbox: BoundingBox,
    /// Whether the segment may be bisected by the split fallback
    pub splittable: bool,
}

impl Segment {
    /// Creates a segment that may be bisected further.
    pub fn splittable(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            splittable: true,
        }
    }

    /// Creates a segment that must not be bisected.
    pub fn atomic(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            splittable: false,
        }
    }
}

/// Tokenization strategies for locating character boxes in a binary mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Connected-component contour bounding boxes
    #[default]
    Contours,
    /// Column-sum profile segmentation
    Projection,
    /// Distance-transform seeded watershed split
    Watershed,
}

impl Strategy {
    /// Directory-suffix / configuration name for this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Contours => "contours",
            Strategy::Projection => "projection",
            Strategy::Watershed => "watershed",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contours" => Ok(Strategy::Contours),
            "projection" => Ok(Strategy::Projection),
            "watershed" => Ok(Strategy::Watershed),
            other => Err(SegmentationError::ProcessingFailed {
                message: format!(
                    "Unknown tokenization strategy '{}'. Expected one of: contours, projection, watershed",
                    other
                ),
            }),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the noise-filtering pass.
#[derive(Debug, Clone)]
pub struct DenoisedImageResult {
    /// The denoised grayscale image
    pub image: GrayImage,
    /// Number of pixels rewritten to background
    pub pixels_cleared: u32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of the binarization pass.
///
/// The contained mask is the storage mask: closed but never dilated. The
/// dilated tokenization mask is rebuilt on demand by the reconciler.
#[derive(Debug, Clone)]
pub struct BinarizedImageResult {
    /// Closed binary mask, ink = 255 on background = 0
    pub image: GrayImage,
    /// Fixed threshold applied before inversion
    pub threshold: u8,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of the adaptive reconciliation sweep.
#[derive(Debug, Clone)]
pub struct ReconciledSegmentation {
    /// Best-effort ordered segments (may still mismatch the expected count)
    pub segments: Vec<Segment>,
    /// Whether the segment count matched the expected character count
    pub matched: bool,
    /// Dilation iteration count of the attempt that produced `segments`
    pub dilation_iterations: u32,
    /// Projection scan step of the producing attempt, if applicable
    pub scan_step: Option<u32>,
    /// Total tokenization attempts made
    pub attempts: u32,
}

/// A single normalized character image paired with its ground-truth symbol.
#[derive(Debug, Clone)]
pub struct CharacterCrop {
    /// Ground-truth symbol for this crop
    pub character: char,
    /// Canonical-resolution crop taken from the storage mask
    pub image: GrayImage,
    /// The box this crop was taken from, clamped to the mask bounds
    pub source_bbox: BoundingBox,
}
