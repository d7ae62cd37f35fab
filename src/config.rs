//! # Slicer Configuration Module
//!
//! This module defines the configuration surface of the batch slicer:
//! tokenization strategy, corpus location, and output destinations. The
//! segmentation search bounds themselves are fixed constants owned by the
//! modules that apply them and are not configurable.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::segmentation::Strategy;

/// Default corpus directory when none is configured.
pub const DEFAULT_INPUT_DIR: &str = "train";

/// Default root of the per-character output directory; the strategy name
/// is appended as a suffix at run time.
pub const DEFAULT_OUTPUT_ROOT: &str = "processed";

/// Default root of the bucketed classification layout.
pub const DEFAULT_BUCKET_ROOT: &str = "processed_train";

/// Configuration for a batch slicing run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlicerConfig {
    /// Tokenization strategy driven by the reconciler
    pub strategy: Strategy,
    /// Directory holding `<label>-<discriminator>.<ext>` CAPTCHA files
    pub input_dir: PathBuf,
    /// Root of the flat per-character output directory (strategy-suffixed)
    pub output_root: PathBuf,
    /// Root of the bucketed per-symbol layout (strategy-suffixed); `None`
    /// leaves the output flat
    pub bucket_root: Option<PathBuf>,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            bucket_root: Some(PathBuf::from(DEFAULT_BUCKET_ROOT)),
        }
    }
}

impl SlicerConfig {
    /// Builds a configuration from environment variables, falling back to
    /// the defaults for anything unset.
    ///
    /// Recognized variables: `SLICER_STRATEGY` (`contours` | `projection`
    /// | `watershed`), `SLICER_INPUT_DIR`, `SLICER_OUTPUT_DIR`, and
    /// `SLICER_BUCKET_DIR` (the literal value `none` disables bucketing).
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let strategy = match env::var("SLICER_STRATEGY") {
            Ok(value) => value
                .parse::<Strategy>()
                .map_err(|e| anyhow::anyhow!("SLICER_STRATEGY is invalid: {}", e))?,
            Err(_) => defaults.strategy,
        };

        let input_dir = env::var("SLICER_INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.input_dir);
        let output_root = env::var("SLICER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_root);
        let bucket_root = match env::var("SLICER_BUCKET_DIR") {
            Ok(value) if value.eq_ignore_ascii_case("none") => None,
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => defaults.bucket_root,
        };

        Ok(Self {
            strategy,
            input_dir,
            output_root,
            bucket_root,
        })
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Unset fields take their default values, mirroring the environment
    /// form.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e)
        })?;
        Ok(config)
    }

    /// Validates the configuration before a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.input_dir.is_dir(),
            "Input path must be an existing directory: {}",
            self.input_dir.display()
        );
        anyhow::ensure!(
            !self.output_root.as_os_str().is_empty(),
            "Output root must not be empty"
        );
        if let Some(bucket) = &self.bucket_root {
            anyhow::ensure!(
                !bucket.as_os_str().is_empty(),
                "Bucket root must not be empty"
            );
        }
        Ok(())
    }

    /// The flat output directory for this run: the output root with the
    /// strategy name appended.
    pub fn output_dir(&self) -> PathBuf {
        suffix_with_strategy(&self.output_root, self.strategy)
    }

    /// The bucketed output directory for this run, if bucketing is
    /// enabled.
    pub fn bucket_dir(&self) -> Option<PathBuf> {
        self.bucket_root
            .as_ref()
            .map(|root| suffix_with_strategy(root, self.strategy))
    }
}

/// Appends `_<strategy>` to the final path component.
fn suffix_with_strategy(root: &Path, strategy: Strategy) -> PathBuf {
    let mut name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('_');
    name.push_str(strategy.as_str());
    root.with_file_name(name)
}
