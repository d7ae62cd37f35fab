//! # Noise Filtering Module
//!
//! This module removes isolated noise pixels from grayscale CAPTCHA images
//! using a local-neighborhood similarity rule. Interference lines drawn over
//! the characters are thin, so their pixels agree with few of their
//! neighbors; genuine strokes are thicker and agree with many.

use image::GrayImage;
use tracing;

use super::types::DenoisedImageResult;

/// Ink intensity in the raw grayscale input.
const INK_VALUE: u8 = 0;

/// Background intensity written over removed noise pixels.
const BACKGROUND_VALUE: u8 = 255;

/// Maximum number of exactly-matching neighbors for a pixel to still count
/// as noise. A pixel with zero matching neighbors is left alone.
const MAX_NOISE_NEIGHBORS: u32 = 3;

/// Removes isolated noise pixels from a grayscale image.
///
/// For every interior pixel (the 1-pixel border is left untouched), the
/// filter counts how many of its 8 neighbors share its exact intensity.
/// Ink pixels (value 0) with at least one but no more than three matching
/// neighbors are treated as interference and overwritten with background
/// (255) in a copy; the input is never mutated.
///
/// The asymmetric bound is deliberate: a completely isolated pixel (zero
/// matching neighbors) is not touched, only thin line fragments are.
///
/// # Arguments
///
/// * `image` - The raw grayscale CAPTCHA image
///
/// # Returns
///
/// Returns a [`DenoisedImageResult`] with the filtered copy and metadata.
///
/// # Examples
///
/// ```no_run
/// use captcha_slicer::segmentation::denoise;
/// use image::open;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let img = open("captcha.png")?.to_luma8();
/// let denoised = denoise(&img);
/// println!("cleared {} noise pixels", denoised.pixels_cleared);
/// # Ok(())
/// # }
/// ```
pub fn denoise(image: &GrayImage) -> DenoisedImageResult {
    let start_time = std::time::Instant::now();

    let (width, height) = image.dimensions();
    let mut result = image.clone();
    let mut pixels_cleared = 0u32;

    if width >= 3 && height >= 3 {
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let value = image.get_pixel(x, y)[0];
                if value != INK_VALUE {
                    continue;
                }

                let matches = count_matching_neighbors(image, x, y, value);
                if matches > 0 && matches <= MAX_NOISE_NEIGHBORS {
                    result.put_pixel(x, y, image::Luma([BACKGROUND_VALUE]));
                    pixels_cleared += 1;
                }
            }
        }
    }

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "captcha_segmentation",
        "Noise filtering completed in {:.2}ms: cleared={}, dimensions={}x{}",
        processing_time.as_millis(),
        pixels_cleared,
        width,
        height
    );

    DenoisedImageResult {
        image: result,
        pixels_cleared,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

/// Counts the 8-neighbors of an interior pixel that share its exact value.
fn count_matching_neighbors(image: &GrayImage, x: u32, y: u32, value: u8) -> u32 {
    let mut count = 0u32;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = (x as i32 + dx) as u32;
            let ny = (y as i32 + dy) as u32;
            if image.get_pixel(nx, ny)[0] == value {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([255]))
    }

    #[test]
    fn test_denoise_removes_thin_line() {
        let mut img = blank_image(10, 10);
        // A thin diagonal interference line: each pixel has exactly two
        // matching neighbors.
        for i in 2..7 {
            img.put_pixel(i, i, image::Luma([0]));
        }

        let result = denoise(&img);

        for i in 3..6 {
            assert_eq!(
                result.image.get_pixel(i, i)[0],
                255,
                "line pixel ({}, {}) should be cleared",
                i,
                i
            );
        }
        assert!(result.pixels_cleared >= 3);
    }

    #[test]
    fn test_denoise_keeps_isolated_pixel() {
        let mut img = blank_image(10, 10);
        // Zero matching neighbors: outside the (0, 3] noise band.
        img.put_pixel(5, 5, image::Luma([0]));

        let result = denoise(&img);

        assert_eq!(result.image.get_pixel(5, 5)[0], 0);
        assert_eq!(result.pixels_cleared, 0);
    }

    #[test]
    fn test_denoise_keeps_thick_stroke_interior() {
        let mut img = blank_image(12, 12);
        // A filled 6x6 block: interior pixels have 8 matching neighbors.
        for y in 3..9 {
            for x in 3..9 {
                img.put_pixel(x, y, image::Luma([0]));
            }
        }

        let result = denoise(&img);

        for y in 5..7 {
            for x in 5..7 {
                assert_eq!(result.image.get_pixel(x, y)[0], 0);
            }
        }
    }

    #[test]
    fn test_denoise_ignores_nonzero_noise() {
        let mut img = blank_image(10, 10);
        // Same geometry as a noise line but not ink-valued.
        for i in 2..7 {
            img.put_pixel(i, i, image::Luma([128]));
        }

        let result = denoise(&img);

        assert_eq!(result.pixels_cleared, 0);
        for i in 2..7 {
            assert_eq!(result.image.get_pixel(i, i)[0], 128);
        }
    }

    #[test]
    fn test_denoise_leaves_border_untouched() {
        let mut img = blank_image(8, 8);
        for x in 0..8 {
            img.put_pixel(x, 0, image::Luma([0]));
        }

        let result = denoise(&img);

        for x in 0..8 {
            assert_eq!(result.image.get_pixel(x, 0)[0], 0);
        }
    }

    #[test]
    fn test_denoise_idempotent_without_ink() {
        let mut img = blank_image(10, 10);
        for (i, pixel) in img.pixels_mut().enumerate() {
            pixel[0] = 100 + (i % 100) as u8;
        }

        let first = denoise(&img);
        let second = denoise(&first.image);

        assert_eq!(first.pixels_cleared, 0);
        assert_eq!(second.pixels_cleared, 0);
        assert_eq!(first.image, second.image);
    }

    #[test]
    fn test_denoise_does_not_mutate_input() {
        let mut img = blank_image(10, 10);
        for i in 2..7 {
            img.put_pixel(i, i, image::Luma([0]));
        }
        let before = img.clone();

        let _ = denoise(&img);

        assert_eq!(img, before);
    }

    #[test]
    fn test_denoise_tiny_image() {
        let img = blank_image(2, 2);
        let result = denoise(&img);
        assert_eq!(result.image.dimensions(), (2, 2));
        assert_eq!(result.pixels_cleared, 0);
    }
}
