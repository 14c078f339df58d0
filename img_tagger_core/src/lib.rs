pub mod labels;
pub mod model;
pub mod report;
pub mod resource;
#[cfg(feature = "tensorflow")]
pub mod tf;
pub mod walk;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

pub use labels::{LookupError, NodeLookup};
pub use model::{load_classifier, top_k, Classifier};
pub use report::{Prediction, Report};
pub use walk::{destination_for, ImageEntry, ImageWalker};

/// Settings for one run, built once and shared by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root_dir: PathBuf,
    /// Glob matched against paths relative to `root_dir`, e.g. `**/250/*.jpg`.
    pub path_pattern: String,
    pub dest_dir: PathBuf,
    /// Holds the model bundle; also the download target.
    pub model_dir: PathBuf,
    pub num_top_predictions: usize,
    /// Reclassify images that already have a report.
    pub overwrite: bool,
    pub model_url: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub classified: usize,
    pub skipped: usize,
}

/// Downloads the model if needed, loads it and classifies the whole directory.
///
/// Fails before touching `model_dir` when no inference backend is compiled in.
pub fn run(config: &Config) -> Result<Summary> {
    anyhow::ensure!(
        model::HAS_BACKEND,
        "no inference backend: rebuild with `--features tensorflow`"
    );
    info!("Loading model...");
    resource::ensure_model(&config.model_dir, &config.model_url)?;
    let lookup = NodeLookup::from_model_dir(&config.model_dir)?;
    let mut classifier = load_classifier(&config.model_dir)?;
    info!("Model loaded");

    classify_directory(config, &mut classifier, &lookup)
}

/// Writes one report per matching image, skipping images that already have
/// one unless `config.overwrite` is set.
pub fn classify_directory<C: Classifier + ?Sized>(
    config: &Config,
    classifier: &mut C,
    lookup: &NodeLookup,
) -> Result<Summary> {
    info!("Start classification");
    let mut summary = Summary::default();
    for entry in ImageWalker::new(&config.root_dir, &config.path_pattern)? {
        let dest = destination_for(&config.root_dir, &entry.path, &config.dest_dir)?;
        if !config.overwrite && dest.exists() {
            info!("File {} already exists, skipped", dest.display());
            summary.skipped += 1;
            continue;
        }

        info!("Classifying {} into {}", entry.path.display(), dest.display());
        let report = classify_image(&entry, classifier, lookup, config.num_top_predictions)?;
        walk::prepare_destination(&dest)?;
        report.write_to(&dest)?;
        summary.classified += 1;
    }
    info!(
        "classified {} images, skipped {}",
        summary.classified, summary.skipped
    );
    Ok(summary)
}

pub fn classify_image<C: Classifier + ?Sized>(
    entry: &ImageEntry,
    classifier: &mut C,
    lookup: &NodeLookup,
    k: usize,
) -> Result<Report> {
    let image = std::fs::read(&entry.path)
        .with_context(|| format!("failed to read {}", entry.path.display()))?;
    let scores = classifier
        .classify(&image)
        .with_context(|| format!("failed to classify {}", entry.path.display()))?;
    let ranked = top_k(&scores, k)?;
    let report = Report::new(&entry.relative, &ranked, lookup);
    for p in &report.predictions {
        debug!("{} {}: {} ({:.5})", entry.relative.display(), p.rank, p.label, p.score);
    }
    Ok(report)
}
