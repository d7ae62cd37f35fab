//! # Binarization Module
//!
//! This module turns a denoised grayscale CAPTCHA into the two binary masks
//! the rest of the pipeline works on: a closed storage mask used for the
//! final character crops, and a dilated tokenization mask rebuilt per
//! reconciliation attempt. After inversion, ink is 255 (foreground) and
//! background is 0, the convention every downstream stage consumes.

use image::GrayImage;
use tracing;

use super::types::BinarizedImageResult;

/// Fixed intensity threshold separating paper from ink.
pub const BINARY_THRESHOLD: u8 = 250;

/// Binarizes a grayscale image into the closed storage mask.
///
/// Steps, in order: fixed threshold at 250 (pixels >= 250 become 255, the
/// rest 0), inversion so ink is foreground (255) on background (0), and a
/// morphological closing with a 3x3 structuring element to fill small gaps
/// inside strokes. The result is the mask character crops are taken from;
/// it is never dilated. Use [`dilate_mask`] to derive the tokenization mask.
///
/// # Arguments
///
/// * `image` - The denoised grayscale image
///
/// # Returns
///
/// Returns a [`BinarizedImageResult`] with the closed mask and metadata.
pub fn binarize(image: &GrayImage) -> BinarizedImageResult {
    let start_time = std::time::Instant::now();

    let (width, height) = image.dimensions();
    let mut binary = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        // Threshold then invert in one pass: bright paper -> 0, ink -> 255.
        let value = if pixel[0] >= BINARY_THRESHOLD { 0u8 } else { 255u8 };
        binary.put_pixel(x, y, image::Luma([value]));
    }

    let closed = close_3x3(&binary);

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "captcha_segmentation",
        "Binarization completed in {:.2}ms: threshold={}, dimensions={}x{}",
        processing_time.as_millis(),
        BINARY_THRESHOLD,
        width,
        height
    );

    BinarizedImageResult {
        image: closed,
        threshold: BINARY_THRESHOLD,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

/// Derives the tokenization mask by dilating the closed storage mask.
///
/// Applies `iterations` passes of a 2x2 dilation (anchor at the top-left)
/// to merge nearby stroke fragments before box finding. Zero iterations
/// return the mask unchanged. Each call starts from the given mask, so the
/// reconciler can rebuild the tokenization mask at any intensity without
/// accumulating earlier passes.
pub fn dilate_mask(mask: &GrayImage, iterations: u32) -> GrayImage {
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = dilate_2x2(&result);
    }
    result
}

/// Morphological closing with a 3x3 structuring element.
///
/// Dilation followed by erosion; fills gaps inside strokes that are smaller
/// than the kernel.
pub fn close_3x3(image: &GrayImage) -> GrayImage {
    erode_3x3(&dilate_3x3(image))
}

/// Morphological opening with a 3x3 structuring element, applied
/// `iterations` times.
///
/// Erosion followed by dilation, with the whole erode/dilate pair repeated
/// per iteration pass the way OpenCV's `morphologyEx` does: all erosions
/// first, then all dilations. Removes speckle smaller than the kernel.
pub fn open_3x3(image: &GrayImage, iterations: u32) -> GrayImage {
    let mut result = image.clone();
    for _ in 0..iterations {
        result = erode_3x3(&result);
    }
    for _ in 0..iterations {
        result = dilate_3x3(&result);
    }
    result
}

/// Dilation with a 3x3 kernel (max over the clamped neighborhood).
pub fn dilate_3x3(image: &GrayImage) -> GrayImage {
    morph_kernel(image, &NEIGHBORHOOD_3X3, false)
}

/// Erosion with a 3x3 kernel (min over the clamped neighborhood).
pub fn erode_3x3(image: &GrayImage) -> GrayImage {
    morph_kernel(image, &NEIGHBORHOOD_3X3, true)
}

/// Dilation with a 2x2 kernel anchored at the top-left.
fn dilate_2x2(image: &GrayImage) -> GrayImage {
    morph_kernel(image, &NEIGHBORHOOD_2X2, false)
}

/// Offsets of a centered 3x3 structuring element.
const NEIGHBORHOOD_3X3: [(i32, i32); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Offsets of a 2x2 structuring element anchored at the top-left.
const NEIGHBORHOOD_2X2: [(i32, i32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Applies a min or max kernel over the given neighborhood offsets.
///
/// Offsets falling outside the image are skipped, which behaves like
/// border replication for binary masks.
fn morph_kernel(image: &GrayImage, offsets: &[(i32, i32)], take_min: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut value = if take_min { 255u8 } else { 0u8 };
            for &(dx, dy) in offsets {
                let nx = x as i64 + dx as i64;
                let ny = y as i64 + dy as i64;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let sample = image.get_pixel(nx as u32, ny as u32)[0];
                value = if take_min {
                    value.min(sample)
                } else {
                    value.max(sample)
                };
            }
            result.put_pixel(x, y, image::Luma([value]));
        }
    }

    result
}
