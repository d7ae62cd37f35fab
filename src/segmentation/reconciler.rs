//! # Reconciliation Module
//!
//! Drives a tokenization strategy through a bounded parameter sweep until
//! its box count matches the expected character count, and bisects
//! oversized splittable segments as a last resort when it stays short.
//!
//! Dilation intensity controls how aggressively nearby strokes merge: too
//! little leaves a character broken into several components, too much
//! fuses neighbors. Matching the ground-truth count is the cheap proxy for
//! a plausible segmentation.

use image::{GrayImage, RgbImage};
use tracing;

use super::binarization::dilate_mask;
use super::contours::tokenize_contours;
use super::projection::tokenize_projection;
use super::types::{ReconciledSegmentation, Segment, Strategy};
use super::watershed::tokenize_watershed;

/// Number of dilation intensities swept by the retry loop (0..=4).
pub const DILATION_SEARCH_STEPS: u32 = 5;

/// Smallest projection scan stride tried by the sweep.
pub const PROJECTION_MIN_STEP: u32 = 1;

/// Largest projection scan stride tried by the sweep.
pub const PROJECTION_MAX_STEP: u32 = 4;

/// Dilation intensity of the first attempt, before any sweeping.
const INITIAL_DILATION: u32 = 1;

/// Projection stride of the first attempt.
const DEFAULT_PROJECTION_STEP: u32 = 3;

/// Reconciles tokenizer output with the expected character count.
///
/// Runs the chosen strategy once on the initially-dilated mask and returns
/// immediately on an exact count match. Otherwise sweeps the dilation
/// intensity over `0..=4` (rebuilding the tokenization mask from the
/// storage mask each time, never cumulatively), and for the projection
/// strategy additionally sweeps the scan stride over `1..=4` per
/// intensity. The first matching combination wins and stops the whole
/// search; an exhausted search returns the last attempted result, which
/// may still mismatch. The watershed strategy takes no parameters and is
/// never retried.
///
/// # Arguments
///
/// * `color` - The original color image (used by the watershed strategy)
/// * `storage_mask` - The closed, never-dilated binary mask
/// * `expected` - Number of characters in the ground-truth label
/// * `strategy` - Tokenization strategy to drive
pub fn reconcile(
    color: &RgbImage,
    storage_mask: &GrayImage,
    expected: usize,
    strategy: Strategy,
) -> ReconciledSegmentation {
    let mut attempts = 0u32;

    let initial_mask = dilate_mask(storage_mask, INITIAL_DILATION);
    let initial = run_strategy(strategy, color, &initial_mask, DEFAULT_PROJECTION_STEP);
    attempts += 1;

    if initial.len() == expected || strategy == Strategy::Watershed {
        let matched = initial.len() == expected;
        tracing::debug!(
            target: "captcha_segmentation",
            "Reconciliation finished after initial attempt: strategy={}, matched={}, boxes={}",
            strategy,
            matched,
            initial.len()
        );
        return ReconciledSegmentation {
            segments: initial,
            matched,
            dilation_iterations: INITIAL_DILATION,
            scan_step: projection_step(strategy, DEFAULT_PROJECTION_STEP),
            attempts,
        };
    }

    let mut last = initial;
    let mut last_params = (INITIAL_DILATION, DEFAULT_PROJECTION_STEP);

    for dilation in 0..DILATION_SEARCH_STEPS {
        let mask = dilate_mask(storage_mask, dilation);
        let steps = match strategy {
            Strategy::Projection => PROJECTION_MIN_STEP..=PROJECTION_MAX_STEP,
            // A single placeholder pass for strategies without a stride.
            _ => DEFAULT_PROJECTION_STEP..=DEFAULT_PROJECTION_STEP,
        };

        for step in steps {
            let segments = run_strategy(strategy, color, &mask, step);
            attempts += 1;
            let matched = segments.len() == expected;
            last = segments;
            last_params = (dilation, step);
            if matched {
                tracing::debug!(
                    target: "captcha_segmentation",
                    "Reconciliation matched: strategy={}, dilation={}, step={}, attempts={}",
                    strategy,
                    dilation,
                    step,
                    attempts
                );
                return ReconciledSegmentation {
                    segments: last,
                    matched: true,
                    dilation_iterations: dilation,
                    scan_step: projection_step(strategy, step),
                    attempts,
                };
            }
        }
    }

    tracing::debug!(
        target: "captcha_segmentation",
        "Reconciliation exhausted its search: strategy={}, expected={}, last={}",
        strategy,
        expected,
        last.len()
    );

    ReconciledSegmentation {
        matched: last.len() == expected,
        dilation_iterations: last_params.0,
        scan_step: projection_step(strategy, last_params.1),
        attempts,
        segments: last,
    }
}

/// Bisects the widest splittable segment until the count matches.
///
/// While the segment count is short of `expected`: stop if no segments
/// remain or the widest one is non-splittable (bisecting a contour or
/// watershed box risks cutting through a stroke); otherwise replace it in
/// place by two adjacent halves of widths `w / 2` and `w - w / 2`. Ties on
/// width go to the leftmost-in-list segment. The count only ever grows,
/// and the input is returned untouched when it already reaches `expected`.
///
/// This is a heuristic halving, not content-aware; the split point may
/// land off the true glyph boundary.
pub fn split_to_match(mut segments: Vec<Segment>, expected: usize) -> Vec<Segment> {
    while segments.len() < expected {
        let Some(widest) = widest_index(&segments) else {
            break;
        };
        if !segments[widest].splittable {
            tracing::debug!(
                target: "captcha_segmentation",
                "Split fallback stopped at a non-splittable segment ({} of {} boxes)",
                segments.len(),
                expected
            );
            break;
        }

        let parent = segments[widest];
        let half_width = parent.bbox.width / 2;
        let mut left = parent;
        left.bbox.width = half_width;
        let mut right = parent;
        right.bbox.x = parent.bbox.x + half_width;
        right.bbox.width = parent.bbox.width - half_width;

        segments[widest] = left;
        segments.insert(widest + 1, right);
    }
    segments
}

/// Index of the first segment with maximal width, if any.
fn widest_index(segments: &[Segment]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, segment) in segments.iter().enumerate() {
        match best {
            Some(current) if segments[current].bbox.width >= segment.bbox.width => {}
            _ => best = Some(index),
        }
    }
    best
}

/// Runs one tokenization attempt with the given parameters.
fn run_strategy(
    strategy: Strategy,
    color: &RgbImage,
    mask: &GrayImage,
    step: u32,
) -> Vec<Segment> {
    match strategy {
        Strategy::Contours => tokenize_contours(mask),
        Strategy::Projection => tokenize_projection(mask, step),
        Strategy::Watershed => tokenize_watershed(color, mask),
    }
}

/// Scan-step metadata only applies to the projection strategy.
fn projection_step(strategy: Strategy, step: u32) -> Option<u32> {
    (strategy == Strategy::Projection).then_some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::types::BoundingBox;

    fn mask_with_blocks(
        width: u32,
        height: u32,
        blocks: &[(u32, u32, u32, u32)],
    ) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for &(x, y, w, h) in blocks {
            for yy in y..y + h {
                for xx in x..x + w {
                    mask.put_pixel(xx, yy, image::Luma([255]));
                }
            }
        }
        mask
    }

    fn white_color(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]))
    }

    #[test]
    fn test_reconcile_contours_selects_matching_dilation() {
        // The left glyph is broken into two fragments with a 2-column gap;
        // the 2x2 dilation bridges it at intensity 2, not before.
        let mask = mask_with_blocks(
            60,
            20,
            &[(5, 4, 5, 13), (12, 4, 5, 13), (30, 4, 9, 13)],
        );
        let color = white_color(60, 20);

        let outcome = reconcile(&color, &mask, 2, Strategy::Contours);

        assert!(outcome.matched);
        assert_eq!(outcome.segments.len(), 2);
        assert_eq!(outcome.dilation_iterations, 2);
        assert_eq!(outcome.scan_step, None);
        assert!(outcome.segments[0].bbox.x < outcome.segments[1].bbox.x);
        // Initial attempt plus the k = 0, 1, 2 sweep entries.
        assert_eq!(outcome.attempts, 4);
    }

    #[test]
    fn test_reconcile_contours_immediate_match_skips_sweep() {
        let mask = mask_with_blocks(60, 20, &[(5, 4, 9, 13), (30, 4, 9, 13)]);
        let color = white_color(60, 20);

        let outcome = reconcile(&color, &mask, 2, Strategy::Contours);

        assert!(outcome.matched);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.dilation_iterations, 1);
    }

    #[test]
    fn test_reconcile_projection_sweeps_step() {
        // At the initial stride of 3 the one-column trough (after the
        // k = 1 dilation) falls between samples; the sweep's first entry
        // (k = 0, step = 1) resolves both humps.
        let mask = mask_with_blocks(40, 20, &[(6, 2, 7, 16), (15, 2, 7, 16)]);
        let color = white_color(40, 20);

        let outcome = reconcile(&color, &mask, 2, Strategy::Projection);

        assert!(outcome.matched);
        assert_eq!(outcome.segments.len(), 2);
        assert_eq!(outcome.dilation_iterations, 0);
        assert_eq!(outcome.scan_step, Some(1));
    }

    #[test]
    fn test_reconcile_watershed_not_retried() {
        let mask = mask_with_blocks(48, 24, &[(6, 4, 10, 14), (30, 4, 10, 14)]);
        let color = white_color(48, 24);

        // Expecting 5 cannot match; the watershed is still tried only once.
        let outcome = reconcile(&color, &mask, 5, Strategy::Watershed);

        assert!(!outcome.matched);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_reconcile_exhaustion_returns_last_attempt() {
        let mask = mask_with_blocks(60, 20, &[(5, 4, 9, 13), (30, 4, 9, 13)]);
        let color = white_color(60, 20);

        let outcome = reconcile(&color, &mask, 5, Strategy::Contours);

        assert!(!outcome.matched);
        assert!(!outcome.segments.is_empty());
        // Initial attempt plus one per swept intensity.
        assert_eq!(outcome.attempts, 1 + DILATION_SEARCH_STEPS);
    }

    #[test]
    fn test_split_to_match_reaches_count() {
        let segments = vec![
            Segment::splittable(BoundingBox::new(0, 0, 20, 30)),
            Segment::splittable(BoundingBox::new(30, 0, 12, 30)),
        ];

        let result = split_to_match(segments, 4);

        assert_eq!(result.len(), 4);
        // The 20-wide segment splits first, then the 12-wide one.
        assert_eq!(result[0].bbox, BoundingBox::new(0, 0, 10, 30));
        assert_eq!(result[1].bbox, BoundingBox::new(10, 0, 10, 30));
        assert_eq!(result[2].bbox, BoundingBox::new(30, 0, 6, 30));
        assert_eq!(result[3].bbox, BoundingBox::new(36, 0, 6, 30));
    }

    #[test]
    fn test_split_to_match_children_widths_sum_to_parent() {
        let segments = vec![Segment::splittable(BoundingBox::new(4, 2, 13, 25))];

        let result = split_to_match(segments, 2);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].bbox.width + result[1].bbox.width, 13);
        assert_eq!(result[0].bbox.width, 6);
        assert_eq!(result[1].bbox.width, 7);
        assert_eq!(result[1].bbox.x, 10);
    }

    #[test]
    fn test_split_to_match_stops_at_non_splittable() {
        let segments = vec![Segment::atomic(BoundingBox::new(0, 0, 40, 30))];

        let result = split_to_match(segments.clone(), 2);

        assert_eq!(result, segments);
    }

    #[test]
    fn test_split_to_match_empty_input() {
        let result = split_to_match(Vec::new(), 3);
        assert!(result.is_empty());
    }

    #[test]
    fn test_split_to_match_never_runs_when_count_reached() {
        let segments = vec![
            Segment::splittable(BoundingBox::new(0, 0, 20, 30)),
            Segment::splittable(BoundingBox::new(25, 0, 20, 30)),
        ];

        let result = split_to_match(segments.clone(), 2);

        assert_eq!(result, segments);
    }

    #[test]
    fn test_split_to_match_tie_goes_to_leftmost() {
        let segments = vec![
            Segment::splittable(BoundingBox::new(0, 0, 10, 30)),
            Segment::splittable(BoundingBox::new(20, 0, 10, 30)),
        ];

        let result = split_to_match(segments, 3);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].bbox, BoundingBox::new(0, 0, 5, 30));
        assert_eq!(result[1].bbox, BoundingBox::new(5, 0, 5, 30));
        assert_eq!(result[2].bbox, BoundingBox::new(20, 0, 10, 30));
    }
}
