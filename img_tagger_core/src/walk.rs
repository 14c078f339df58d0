use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use tracing::warn;
use walkdir::WalkDir;

/// Extension of the written classification reports.
pub const REPORT_EXTENSION: &str = "txt";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub path: PathBuf,
    /// `path` with the root directory stripped.
    pub relative: PathBuf,
}

/// Lazily yields the files under `root` whose relative path matches a glob.
///
/// `*` stays within one path component and `**` as a whole component spans
/// any number of directories, including none. Wildcards never match a
/// leading `.`, so hidden files and directories are only found when the
/// pattern names the dot literally.
///
/// Siblings are visited in file name order, so two walks over the same tree
/// produce the same sequence.
pub struct ImageWalker {
    root: PathBuf,
    pattern: Pattern,
    inner: walkdir::IntoIter,
}

impl ImageWalker {
    pub fn new(root: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let pattern =
            Pattern::new(pattern).with_context(|| format!("invalid path pattern {pattern:?}"))?;
        let inner = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();
        Ok(Self {
            root,
            pattern,
            inner,
        })
    }
}

impl Iterator for ImageWalker {
    type Item = ImageEntry;

    fn next(&mut self) -> Option<ImageEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if self.pattern.matches_path_with(relative, MATCH_OPTIONS) {
                let relative = relative.to_path_buf();
                return Some(ImageEntry {
                    path: entry.into_path(),
                    relative,
                });
            }
        }
    }
}

/// Maps an image below `root` to its report path below `dest_dir`.
///
/// The extension is replaced by [`REPORT_EXTENSION`] and the subdirectories
/// between `root` and the image are kept.
pub fn destination_for(root: &Path, image: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let relative = image.strip_prefix(root).with_context(|| {
        format!("{} is not below {}", image.display(), root.display())
    })?;
    Ok(dest_dir.join(relative).with_extension(REPORT_EXTENSION))
}

pub fn prepare_destination(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}
