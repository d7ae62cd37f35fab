//! # Character Cropping Module
//!
//! Extracts each reconciled box from the storage mask and normalizes it to
//! the canonical classifier resolution, pairing every crop positionally
//! with its ground-truth character.

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing;

use super::types::{BoundingBox, CharacterCrop, Segment, SegmentationError};

/// Canonical square resolution of emitted character images.
pub const CANONICAL_CHAR_SIZE: u32 = 224;

/// Crops and normalizes one character image per segment.
///
/// Boxes must come in x-order; segment `i` is paired with character `i` of
/// the label. Crops are taken from the storage mask (the closed,
/// never-dilated binary image), clamped to its bounds, and resized to
/// 224x224 with bilinear filtering, which keeps thin strokes reasonably
/// intact at small sizes.
///
/// # Errors
///
/// Returns [`SegmentationError::CountMismatch`] when the segment count
/// does not equal the label length; the caller is expected to drop the
/// sample and emit nothing. An empty label with no segments is valid and
/// yields an empty crop list.
pub fn crop_characters(
    storage_mask: &GrayImage,
    segments: &[Segment],
    label: &str,
) -> Result<Vec<CharacterCrop>, SegmentationError> {
    let start_time = std::time::Instant::now();

    let expected = label.chars().count();
    if segments.len() != expected {
        return Err(SegmentationError::CountMismatch {
            expected,
            actual: segments.len(),
        });
    }

    let crops: Vec<CharacterCrop> = label
        .chars()
        .zip(segments)
        .map(|(character, segment)| {
            let bbox = clamp_to_image(segment.bbox, storage_mask);
            let region =
                imageops::crop_imm(storage_mask, bbox.x, bbox.y, bbox.width, bbox.height)
                    .to_image();
            let image = imageops::resize(
                &region,
                CANONICAL_CHAR_SIZE,
                CANONICAL_CHAR_SIZE,
                FilterType::Triangle,
            );
            CharacterCrop {
                character,
                image,
                source_bbox: bbox,
            }
        })
        .collect();

    tracing::debug!(
        target: "captcha_segmentation",
        "Cropped {} characters in {:.2}ms",
        crops.len(),
        start_time.elapsed().as_millis()
    );

    Ok(crops)
}

/// Clamps a box to the image bounds, keeping at least one pixel of extent.
fn clamp_to_image(bbox: BoundingBox, image: &GrayImage) -> BoundingBox {
    let (width, height) = image.dimensions();
    let x = bbox.x.min(width.saturating_sub(1));
    let y = bbox.y.min(height.saturating_sub(1));
    let w = bbox.width.clamp(1, width - x);
    let h = bbox.height.clamp(1, height - y);
    BoundingBox::new(x, y, w, h)
}
