use anyhow::Result;
use captcha_slicer::config::SlicerConfig;
use captcha_slicer::dataset;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // An optional config file takes precedence over individual variables.
    let config = match env::var("SLICER_CONFIG_FILE") {
        Ok(path) => SlicerConfig::from_file(&PathBuf::from(path))?,
        Err(_) => SlicerConfig::from_env()?,
    };
    config.validate()?;

    info!(
        strategy = %config.strategy,
        input = %config.input_dir.display(),
        output = %config.output_dir().display(),
        "Starting batch slicing run"
    );

    let report = dataset::run_batch(&config)?;

    info!(
        processed = report.processed_samples,
        skipped = report.skipped_samples,
        emitted = report.emitted_characters,
        expected = report.expected_characters,
        "Run finished with yield {:.3}",
        report.yield_ratio
    );

    Ok(())
}
