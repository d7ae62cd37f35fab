//! # Projection Tokenizer Module
//!
//! Locates candidate character boxes from the 1-D column-sum profile of the
//! tokenization mask: columns dense with ink are inside a character, sparse
//! columns are the gaps between characters.

use image::GrayImage;
use tracing;

use super::types::{BoundingBox, Segment};

/// Fraction of the profile maximum used as the in-character threshold.
const PROFILE_THRESHOLD_RATIO: f64 = 0.2;

/// Tokenizes a binary mask by scanning its column-sum profile.
///
/// Sums pixel intensities per column, then walks the profile left to right
/// with a stride of `step`. Crossing above `0.2 * max(profile)` opens a
/// segment; falling back to or below the threshold closes it at the current
/// column. A segment still open at scan end is dropped. Segments span the
/// full mask height and are splittable, since a projection box can be
/// safely bisected along a column.
///
/// The scan is monotonic, so the output is naturally ordered by x-origin.
pub fn tokenize_projection(mask: &GrayImage, step: u32) -> Vec<Segment> {
    let (width, height) = mask.dimensions();
    let step = step.max(1) as usize;

    let profile: Vec<u64> = (0..width)
        .map(|x| (0..height).map(|y| mask.get_pixel(x, y)[0] as u64).sum())
        .collect();

    let Some(&max_sum) = profile.iter().max() else {
        return Vec::new();
    };
    let threshold = PROFILE_THRESHOLD_RATIO * max_sum as f64;

    let mut segments = Vec::new();
    let mut start: Option<u32> = None;

    for x in (0..width).step_by(step) {
        let sum = profile[x as usize] as f64;
        match start {
            None if sum > threshold => start = Some(x),
            Some(opened) if sum <= threshold => {
                segments.push(Segment::splittable(BoundingBox::new(
                    opened,
                    0,
                    x - opened,
                    height,
                )));
                start = None;
            }
            _ => {}
        }
    }

    tracing::debug!(
        target: "captcha_segmentation",
        "Projection tokenization produced {} boxes (step={}, threshold={:.1})",
        segments.len(),
        step,
        threshold
    );

    segments
}
