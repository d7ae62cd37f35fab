//! # Contour Tokenizer Module
//!
//! Locates candidate character boxes by tracing the external contours of
//! connected components in the tokenization mask, filtering out noise blobs
//! by relative area.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use tracing;

use super::types::{BoundingBox, Segment};

/// Area-filter divisor: contours smaller than the largest bounding-box area
/// divided by this factor are discarded as noise blobs.
const AREA_FILTER_DIVISOR: f64 = 10.0;

/// Tokenizes a binary mask into character candidates via external contours.
///
/// Finds the outer contours of the mask's foreground (255) regions (hole
/// borders are ignored), takes each contour's bounding box, discards boxes
/// whose area is at most a tenth of the largest box, and sorts the
/// survivors by ascending x-origin. All resulting segments are
/// non-splittable: a contour box has no interior structure the split
/// fallback could safely bisect.
///
/// Returns an empty list when the mask has no foreground at all.
pub fn tokenize_contours(mask: &GrayImage) -> Vec<Segment> {
    let contours: Vec<Contour<u32>> = find_contours(mask);

    let boxes: Vec<BoundingBox> = contours
        .iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| contour_bounding_box(contour))
        .collect();

    let Some(max_area) = boxes.iter().map(|bbox| bbox.area()).max() else {
        tracing::debug!(
            target: "captcha_segmentation",
            "Contour tokenization found no foreground components"
        );
        return Vec::new();
    };

    let mut segments: Vec<Segment> = boxes
        .into_iter()
        .filter(|bbox| bbox.area() as f64 > max_area as f64 / AREA_FILTER_DIVISOR)
        .map(Segment::atomic)
        .collect();

    segments.sort_by_key(|segment| segment.bbox.x);

    tracing::debug!(
        target: "captcha_segmentation",
        "Contour tokenization produced {} boxes (max area {})",
        segments.len(),
        max_area
    );

    segments
}

/// Axis-aligned bounding box of a traced contour's points.
fn contour_bounding_box(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);

    for point in &contour.points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Some(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_blocks(blocks: &[(u32, u32, u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(60, 30);
        for &(x, y, w, h) in blocks {
            for yy in y..y + h {
                for xx in x..x + w {
                    mask.put_pixel(xx, yy, image::Luma([255]));
                }
            }
        }
        mask
    }

    #[test]
    fn test_tokenize_contours_two_blocks() {
        let mask = mask_with_blocks(&[(30, 5, 8, 12), (5, 5, 8, 12)]);

        let segments = tokenize_contours(&mask);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].bbox, BoundingBox::new(5, 5, 8, 12));
        assert_eq!(segments[1].bbox, BoundingBox::new(30, 5, 8, 12));
        assert!(segments.iter().all(|s| !s.splittable));
    }

    #[test]
    fn test_tokenize_contours_sorted_by_x() {
        let mask = mask_with_blocks(&[(40, 3, 10, 14), (2, 4, 10, 12), (20, 2, 10, 16)]);

        let segments = tokenize_contours(&mask);

        assert_eq!(segments.len(), 3);
        for pair in segments.windows(2) {
            assert!(pair[0].bbox.x <= pair[1].bbox.x);
        }
    }

    #[test]
    fn test_tokenize_contours_filters_small_blobs() {
        // A 12x14 glyph and a 2x2 speck: 168 vs 4 area, well below a tenth.
        let mask = mask_with_blocks(&[(5, 5, 12, 14), (40, 10, 2, 2)]);

        let segments = tokenize_contours(&mask);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].bbox.x, 5);
    }

    #[test]
    fn test_tokenize_contours_empty_mask() {
        let mask = GrayImage::new(40, 20);
        let segments = tokenize_contours(&mask);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_tokenize_contours_hole_not_counted() {
        // A ring: outer contour plus a hole; the hole border must not
        // produce a segment of its own.
        let mut mask = mask_with_blocks(&[(10, 5, 12, 12)]);
        for yy in 9..13 {
            for xx in 14..18 {
                mask.put_pixel(xx, yy, image::Luma([0]));
            }
        }

        let segments = tokenize_contours(&mask);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].bbox, BoundingBox::new(10, 5, 12, 12));
    }
}
