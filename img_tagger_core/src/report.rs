use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::labels::NodeLookup;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Starts at 1.
    pub rank: usize,
    pub label: String,
    pub score: f32,
}

/// Classification of a single image, rendered as
///
/// ```text
/// image: cats/250/a.jpg
/// score 1: tabby, tabby cat (score = 0.61349)
/// score 2: tiger cat (score = 0.20154)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub relative_path: PathBuf,
    pub predictions: Vec<Prediction>,
}

impl Report {
    /// Builds the report from ranked `(node id, score)` pairs.
    pub fn new(relative_path: &Path, ranked: &[(usize, f32)], lookup: &NodeLookup) -> Self {
        let predictions = ranked
            .iter()
            .enumerate()
            .map(|(i, &(node_id, score))| Prediction {
                rank: i + 1,
                label: i32::try_from(node_id)
                    .map(|id| lookup.id_to_string(id))
                    .unwrap_or("")
                    .to_string(),
                score,
            })
            .collect();
        Self {
            relative_path: relative_path.to_path_buf(),
            predictions,
        }
    }

    /// Writes the whole report at once, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "image: {}", self.relative_path.display())?;
        for p in &self.predictions {
            writeln!(f, "score {}: {} (score = {:.5})", p.rank, p.label, p.score)?;
        }
        Ok(())
    }
}
