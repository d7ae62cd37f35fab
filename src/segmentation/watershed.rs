//! # Watershed Tokenizer Module
//!
//! Splits touching glyphs by flooding the image from confident foreground
//! seeds. Seeds are the cores of the distance transform; the flood runs
//! over the color image's gradient magnitude so region fronts meet along
//! intensity ridges, which is where touching characters join.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing;

use super::binarization::{dilate_3x3, open_3x3};
use super::types::{BoundingBox, Segment};

/// Opening passes applied before the distance transform.
const OPENING_ITERATIONS: u32 = 2;

/// Dilation passes producing the confident background region.
const SURE_BACKGROUND_DILATIONS: u32 = 3;

/// Fraction of the distance-transform maximum above which a pixel is a
/// confident foreground seed.
const FOREGROUND_DISTANCE_RATIO: f64 = 0.7;

/// Marker value of the confident-background seed region.
const BACKGROUND_LABEL: u32 = 1;

/// Marker value assigned where two flood fronts meet.
const RIDGE_LABEL: u32 = u32::MAX;

/// Tokenizes a binary mask by marker-controlled watershed flooding.
///
/// The mask is opened to drop speckle, dilated into a confident background
/// region, and distance-transformed to find confident foreground cores
/// (strictly above 70% of the distance maximum). Connected cores become
/// markers, offset by one so the confident background floods as its own
/// region and 0 stays reserved for the undecided band between them. The
/// flood then grows all markers over the color image's gradients; each
/// surviving foreground region yields one bounding box.
///
/// Output boxes are sorted by ascending x-origin and are non-splittable.
/// The strategy takes no tuning parameter, so the reconciler never sweeps
/// it.
pub fn tokenize_watershed(color: &RgbImage, mask: &GrayImage) -> Vec<Segment> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let opened = open_3x3(mask, OPENING_ITERATIONS);

    let mut sure_bg = opened.clone();
    for _ in 0..SURE_BACKGROUND_DILATIONS {
        sure_bg = dilate_3x3(&sure_bg);
    }

    let sure_fg = confident_foreground(&opened);

    // Marker labelling: connected seed cores, shifted so the confident
    // background becomes label 1 and 0 marks the undecided band.
    let components = connected_components(&sure_fg, Connectivity::Eight, Luma([0u8]));
    let mut markers: Vec<u32> = vec![0; (width * height) as usize];
    let mut seed_count = 0u32;
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let component = components.get_pixel(x, y)[0];
            let in_unknown = sure_bg.get_pixel(x, y)[0] > 0 && sure_fg.get_pixel(x, y)[0] == 0;
            if in_unknown {
                markers[idx] = 0;
            } else {
                markers[idx] = component + 1;
                seed_count = seed_count.max(component + 1);
            }
        }
    }

    if seed_count <= BACKGROUND_LABEL {
        tracing::debug!(
            target: "captcha_segmentation",
            "Watershed found no foreground seeds"
        );
        return Vec::new();
    }

    let gradient = gradient_magnitude(color);
    flood(&mut markers, &gradient, width, height);

    let mut segments = label_bounding_boxes(&markers, width, height, seed_count);
    segments.sort_by_key(|segment| segment.bbox.x);

    tracing::debug!(
        target: "captcha_segmentation",
        "Watershed tokenization produced {} boxes from {} seeds",
        segments.len(),
        seed_count - BACKGROUND_LABEL
    );

    segments
}

/// Thresholds the opened mask's distance transform at 70% of its maximum.
///
/// imageproc measures distance TO the nearest foreground pixel, the inverse
/// of the convention needed here, so the mask is inverted first: each ink
/// pixel then carries its distance to the nearest background pixel.
fn confident_foreground(opened: &GrayImage) -> GrayImage {
    let (width, height) = opened.dimensions();

    let mut inverted = GrayImage::new(width, height);
    for (x, y, pixel) in opened.enumerate_pixels() {
        let value = if pixel[0] > 0 { 0u8 } else { 255u8 };
        inverted.put_pixel(x, y, Luma([value]));
    }

    let distance_sq = euclidean_squared_distance_transform(&inverted);
    let max_distance = distance_sq
        .pixels()
        .map(|p| p[0].sqrt())
        .fold(0.0f64, f64::max);

    let cutoff = FOREGROUND_DISTANCE_RATIO * max_distance;
    let mut sure_fg = GrayImage::new(width, height);
    for (x, y, pixel) in distance_sq.enumerate_pixels() {
        if pixel[0].sqrt() > cutoff && max_distance > 0.0 {
            sure_fg.put_pixel(x, y, Luma([255]));
        }
    }
    sure_fg
}

/// Per-pixel gradient magnitude of the color image.
///
/// The luma difference to the 4-neighborhood is enough of a relief map for
/// the flood: character edges score high, flat paper and flat ink score
/// zero.
fn gradient_magnitude(color: &RgbImage) -> Vec<u32> {
    let luma = image::imageops::grayscale(color);
    let (width, height) = luma.dimensions();
    let mut gradient = vec![0u32; (width * height) as usize];

    for y in 0..height {
        for x in 0..width {
            let center = luma.get_pixel(x, y)[0] as i32;
            let mut steepest = 0i32;
            for (nx, ny) in four_neighbors(x, y, width, height) {
                let diff = (luma.get_pixel(nx, ny)[0] as i32 - center).abs();
                steepest = steepest.max(diff);
            }
            gradient[(y * width + x) as usize] = steepest as u32;
        }
    }

    gradient
}

/// Meyer's flooding: grow all marked regions in order of ascending gradient
/// until the undecided band is claimed; pixels reached by two distinct
/// regions become ridge pixels.
fn flood(markers: &mut [u32], gradient: &[u32], width: u32, height: u32) {
    // (gradient, insertion order, x, y); the order term keeps the heap
    // FIFO among equal gradients.
    let mut heap: BinaryHeap<Reverse<(u32, u64, u32, u32)>> = BinaryHeap::new();
    let mut queued = vec![false; markers.len()];
    let mut sequence = 0u64;

    for y in 0..height {
        for x in 0..width {
            if markers[(y * width + x) as usize] == 0 {
                continue;
            }
            for (nx, ny) in four_neighbors(x, y, width, height) {
                let nidx = (ny * width + nx) as usize;
                if markers[nidx] == 0 && !queued[nidx] {
                    queued[nidx] = true;
                    heap.push(Reverse((gradient[nidx], sequence, nx, ny)));
                    sequence += 1;
                }
            }
        }
    }

    while let Some(Reverse((_, _, x, y))) = heap.pop() {
        let idx = (y * width + x) as usize;
        if markers[idx] != 0 {
            continue;
        }

        let mut claimed = 0u32;
        let mut on_ridge = false;
        for (nx, ny) in four_neighbors(x, y, width, height) {
            let neighbor = markers[(ny * width + nx) as usize];
            if neighbor == 0 || neighbor == RIDGE_LABEL {
                continue;
            }
            if claimed == 0 {
                claimed = neighbor;
            } else if claimed != neighbor {
                on_ridge = true;
            }
        }

        if on_ridge {
            markers[idx] = RIDGE_LABEL;
            continue;
        }
        if claimed == 0 {
            // All labeled neighbors turned into ridge pixels; leave the
            // pixel unclaimed.
            continue;
        }

        markers[idx] = claimed;
        for (nx, ny) in four_neighbors(x, y, width, height) {
            let nidx = (ny * width + nx) as usize;
            if markers[nidx] == 0 && !queued[nidx] {
                queued[nidx] = true;
                heap.push(Reverse((gradient[nidx], sequence, nx, ny)));
                sequence += 1;
            }
        }
    }
}

/// Bounding boxes of all flooded regions except the background seed and
/// ridge pixels.
fn label_bounding_boxes(
    markers: &[u32],
    width: u32,
    height: u32,
    max_label: u32,
) -> Vec<Segment> {
    let mut extents: Vec<Option<(u32, u32, u32, u32)>> = vec![None; max_label as usize + 1];

    for y in 0..height {
        for x in 0..width {
            let label = markers[(y * width + x) as usize];
            if label <= BACKGROUND_LABEL || label == RIDGE_LABEL {
                continue;
            }
            let entry = &mut extents[label as usize];
            *entry = Some(match *entry {
                None => (x, y, x, y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                }
            });
        }
    }

    extents
        .into_iter()
        .flatten()
        .map(|(min_x, min_y, max_x, max_y)| {
            Segment::atomic(BoundingBox::new(
                min_x,
                min_y,
                max_x - min_x + 1,
                max_y - min_y + 1,
            ))
        })
        .collect()
}

/// In-bounds 4-neighborhood of a pixel.
fn four_neighbors(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let (x, y) = (x as i64, y as i64);
    [(x, y - 1), (x - 1, y), (x + 1, y), (x, y + 1)]
        .into_iter()
        .filter(move |&(nx, ny)| nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64)
        .map(|(nx, ny)| (nx as u32, ny as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a white CAPTCHA-like color image and its binary mask with
    /// solid ink blocks at the given rectangles.
    fn sample_with_blocks(
        width: u32,
        height: u32,
        blocks: &[(u32, u32, u32, u32)],
    ) -> (RgbImage, GrayImage) {
        let mut color = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mut mask = GrayImage::new(width, height);
        for &(x, y, w, h) in blocks {
            for yy in y..y + h {
                for xx in x..x + w {
                    color.put_pixel(xx, yy, image::Rgb([0, 0, 0]));
                    mask.put_pixel(xx, yy, Luma([255]));
                }
            }
        }
        (color, mask)
    }

    #[test]
    fn test_tokenize_watershed_two_separate_glyphs() {
        let (color, mask) = sample_with_blocks(48, 24, &[(6, 4, 10, 14), (30, 4, 10, 14)]);

        let segments = tokenize_watershed(&color, &mask);

        assert_eq!(segments.len(), 2);
        assert!(segments[0].bbox.x < segments[1].bbox.x);
        assert!(segments.iter().all(|s| !s.splittable));
        // Each region stays on its own side of the gap's center line.
        assert!(segments[0].bbox.right() <= 30);
        assert!(segments[1].bbox.x >= 16);
    }

    #[test]
    fn test_tokenize_watershed_empty_mask() {
        let (color, mask) = sample_with_blocks(32, 16, &[]);

        let segments = tokenize_watershed(&color, &mask);

        assert!(segments.is_empty());
    }

    #[test]
    fn test_tokenize_watershed_speckle_only() {
        // A lone 2x2 speck is erased by the opening; no seeds remain.
        let (color, mask) = sample_with_blocks(32, 16, &[(10, 8, 2, 2)]);

        let segments = tokenize_watershed(&color, &mask);

        assert!(segments.is_empty());
    }

    #[test]
    fn test_confident_foreground_is_block_core() {
        let (_, mask) = sample_with_blocks(32, 24, &[(4, 4, 12, 16)]);

        let sure_fg = confident_foreground(&mask);

        // The core of the block is confidently foreground, the rim is not.
        let core: u32 = sure_fg.pixels().map(|p| (p[0] > 0) as u32).sum();
        assert!(core > 0);
        assert_eq!(sure_fg.get_pixel(4, 4)[0], 0);
        assert_eq!(sure_fg.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_gradient_flat_image_is_zero() {
        let color = RgbImage::from_pixel(8, 8, image::Rgb([128, 128, 128]));
        let gradient = gradient_magnitude(&color);
        assert!(gradient.iter().all(|&g| g == 0));
    }
}
