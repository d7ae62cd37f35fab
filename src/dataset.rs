//! # Dataset Preparation Module
//!
//! This module drives the segmentation pipeline over a corpus of labeled
//! CAPTCHA files and organizes the per-character output for classifier
//! training. Input files are named `<label>-<discriminator>.<ext>`;
//! each successfully segmented character is written as
//! `<character>_<occurrence>.png` and optionally bucketed into one
//! subdirectory per recognized symbol.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::config::SlicerConfig;
use crate::segmentation::{
    binarize, crop_characters, denoise, reconcile, split_to_match, SegmentationError, Strategy,
};

/// A source image paired with its ground-truth label.
///
/// Created per input file, consumed once by the pipeline, then discarded.
#[derive(Debug)]
pub struct LabeledSample {
    /// Path the sample was loaded from
    pub path: PathBuf,
    /// Ground-truth character sequence parsed from the filename
    pub label: String,
    /// The decoded source image
    pub image: DynamicImage,
}

impl LabeledSample {
    /// Loads a sample, deriving its label from the file name.
    pub fn load(path: &Path) -> Result<Self, SegmentationError> {
        let label = label_from_path(path).ok_or_else(|| SegmentationError::ImageLoad {
            message: format!("Cannot derive a label from '{}'", path.display()),
        })?;
        let image = image::open(path).map_err(|e| SegmentationError::ImageLoad {
            message: format!("Failed to load image '{}': {}", path.display(), e),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            label,
            image,
        })
    }
}

/// The ground-truth label is the filename prefix before the first `-`,
/// case-sensitive as given. Files without a `-` use their whole stem.
fn label_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.split('-').next().unwrap_or(stem);
    (!label.is_empty()).then(|| label.to_string())
}

/// Running tally of emitted characters for the whole batch run.
///
/// Owned by the batch driver and passed into the emission step; it is the
/// only state shared across samples. Per-character counts grow on emission
/// only, while the expected total grows by label length for every sample
/// visited, including skipped ones, so the yield ratio reflects dropped
/// samples.
#[derive(Debug, Default)]
pub struct CharacterFrequencyCounter {
    counts: HashMap<char, u64>,
    expected_total: u64,
    emitted_total: u64,
}

impl CharacterFrequencyCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a visited sample's label length to the expected total.
    pub fn record_expected(&mut self, label_length: usize) {
        self.expected_total += label_length as u64;
    }

    /// Registers one emission of `character` and returns its 1-based
    /// occurrence index, used to build a collision-free filename.
    pub fn next_occurrence(&mut self, character: char) -> u64 {
        let count = self.counts.entry(character).or_insert(0);
        *count += 1;
        self.emitted_total += 1;
        *count
    }

    /// Emissions recorded so far for one character.
    pub fn count_for(&self, character: char) -> u64 {
        self.counts.get(&character).copied().unwrap_or(0)
    }

    /// Total characters expected from all visited samples.
    pub fn expected_total(&self) -> u64 {
        self.expected_total
    }

    /// Total characters actually emitted.
    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }

    /// Emitted / expected ratio; zero when nothing was expected.
    pub fn yield_ratio(&self) -> f64 {
        if self.expected_total == 0 {
            0.0
        } else {
            self.emitted_total as f64 / self.expected_total as f64
        }
    }
}

/// Summary of a completed batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Samples that produced output
    pub processed_samples: usize,
    /// Samples dropped by count mismatch or load failure
    pub skipped_samples: usize,
    /// Characters written to the output directory
    pub emitted_characters: u64,
    /// Characters expected across all visited samples
    pub expected_characters: u64,
    /// Emitted / expected ratio
    pub yield_ratio: f64,
}

/// Runs the full pipeline over every supported image in the input
/// directory.
///
/// Samples are processed strictly one at a time; a sample that cannot be
/// reconciled (or fails to load) is skipped with a warning and never
/// aborts the batch. When bucketing is configured, the flat output is
/// reorganized into per-symbol subdirectories afterwards.
pub fn run_batch(config: &SlicerConfig) -> Result<BatchReport> {
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut paths: Vec<PathBuf> = fs::read_dir(&config.input_dir)
        .with_context(|| format!("Failed to read input directory {}", config.input_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported_image(path))
        .collect();
    paths.sort();

    info!(
        "Slicing {} files from {} with the {} strategy",
        paths.len(),
        config.input_dir.display(),
        config.strategy
    );

    let mut counter = CharacterFrequencyCounter::new();
    let mut processed_samples = 0usize;
    let mut skipped_samples = 0usize;

    for path in &paths {
        let sample = match LabeledSample::load(path) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped_samples += 1;
                continue;
            }
        };

        match process_sample(&sample, config.strategy, &mut counter, &output_dir) {
            Ok(emitted) => {
                debug!(
                    target: "captcha_segmentation",
                    "Processed {} -> {} characters",
                    path.display(),
                    emitted
                );
                processed_samples += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped_samples += 1;
            }
        }
    }

    let report = BatchReport {
        processed_samples,
        skipped_samples,
        emitted_characters: counter.emitted_total(),
        expected_characters: counter.expected_total(),
        yield_ratio: counter.yield_ratio(),
    };

    info!(
        "Batch complete: {} processed, {} skipped, yield {:.3}",
        report.processed_samples, report.skipped_samples, report.yield_ratio
    );

    if let Some(bucket_dir) = config.bucket_dir() {
        let moved = bucket_by_symbol(&output_dir, &bucket_dir)?;
        info!("Bucketed {} files into {}", moved, bucket_dir.display());
    }

    Ok(report)
}

/// Processes one sample through the full segmentation pipeline and writes
/// its character crops.
///
/// Returns the number of characters emitted. The sample's label length is
/// added to the counter's expected total up front, so a later skip still
/// counts against the yield.
pub fn process_sample(
    sample: &LabeledSample,
    strategy: Strategy,
    counter: &mut CharacterFrequencyCounter,
    output_dir: &Path,
) -> Result<usize, SegmentationError> {
    let expected = sample.label.chars().count();
    counter.record_expected(expected);

    let gray = sample.image.to_luma8();
    let color = sample.image.to_rgb8();

    let denoised = denoise(&gray);
    let binarized = binarize(&denoised.image);

    let outcome = reconcile(&color, &binarized.image, expected, strategy);
    let segments = if outcome.segments.len() < expected {
        split_to_match(outcome.segments, expected)
    } else {
        outcome.segments
    };

    let crops = crop_characters(&binarized.image, &segments, &sample.label)?;

    let mut emitted = 0usize;
    for crop in &crops {
        let occurrence = counter.next_occurrence(crop.character);
        let filename = format!("{}_{}.png", crop.character, occurrence);
        let destination = output_dir.join(&filename);
        crop.image
            .save(&destination)
            .map_err(|e| SegmentationError::ProcessingFailed {
                message: format!("Failed to write {}: {}", destination.display(), e),
            })?;
        emitted += 1;
    }

    Ok(emitted)
}

/// Reorganizes a flat directory of `<character>_<n>.png` files into one
/// subdirectory per recognized symbol (digits and lowercase letters).
///
/// Each file moves into the subdirectory named by its case-folded leading
/// character; files with an unrecognized leading character are left where
/// they are. Returns the number of files moved.
pub fn bucket_by_symbol(source: &Path, destination: &Path) -> Result<usize> {
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    for symbol in recognized_symbols() {
        let dir = destination.join(symbol.to_string());
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut moved = 0usize;
    for entry in fs::read_dir(source)
        .with_context(|| format!("Failed to read {}", source.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".png") {
            continue;
        }
        let Some(first) = name.chars().next().map(|c| c.to_ascii_lowercase()) else {
            continue;
        };
        if !is_recognized_symbol(first) {
            continue;
        }

        let target = destination.join(first.to_string()).join(name);
        fs::rename(&path, &target)
            .with_context(|| format!("Failed to move {} to {}", path.display(), target.display()))?;
        moved += 1;
    }

    Ok(moved)
}

/// The 36 classification symbols: digits 0-9 and lowercase a-z.
fn recognized_symbols() -> impl Iterator<Item = char> {
    ('0'..='9').chain('a'..='z')
}

fn is_recognized_symbol(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_lowercase()
}

/// Only these extensions are treated as corpus images.
fn is_supported_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "png" || ext == "jpg" || ext == "jpeg"
    )
}
