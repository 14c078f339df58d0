use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::labels::{LABEL_MAP_FILE, SYNSET_MAP_FILE};
use crate::model::GRAPH_FILE;

/// Files that make up an unpacked bundle.
pub const BUNDLE_FILES: [&str; 3] = [GRAPH_FILE, LABEL_MAP_FILE, SYNSET_MAP_FILE];

/// Inception v3 bundle: graph plus the two label files.
pub const DATA_URL: &str =
    "http://download.tensorflow.org/models/image/imagenet/inception-2015-12-05.tgz";

/// Makes sure `model_dir` holds an unpacked model bundle.
///
/// Nothing happens when every bundle file is there. Otherwise the cached
/// archive is unpacked again, which also repairs an interrupted unpack, and
/// only a missing archive is fetched.
pub fn ensure_model(model_dir: &Path, url: &str) -> Result<()> {
    if BUNDLE_FILES.iter().all(|f| model_dir.join(f).exists()) {
        return Ok(());
    }
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create {}", model_dir.display()))?;

    let archive = model_dir.join(archive_name(url)?);
    if !archive.exists() {
        download(url, &archive)?;
    }
    extract(&archive, model_dir)
}

fn archive_name(url: &str) -> Result<&str> {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::format_err!("no file name in url {url}"))
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("failed to download {url}"))?;

    let bar = progress_bar(response.content_length())?;
    bar.set_message(filename.to_string());

    // Renamed once complete so an interrupted transfer is never taken for
    // the finished archive.
    let partial = partial_path(dest);
    let mut file = File::create(&partial)
        .with_context(|| format!("failed to create {}", partial.display()))?;
    let written = std::io::copy(&mut bar.wrap_read(response), &mut file)
        .with_context(|| format!("failed to download {url}"))?;
    bar.finish();
    drop(file);
    std::fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;

    info!("Successfully downloaded {filename} {written} bytes.");
    Ok(())
}

/// A byte counter; without a known length there is no total to show.
fn progress_bar(len: Option<u64>) -> Result<ProgressBar> {
    let bar = match len {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(
                    ">> Downloading {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)",
                )?
                .progress_chars("#>-"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template(
                "{spinner:.green} >> Downloading {msg} {bytes} ({bytes_per_sec})",
            )?);
            bar
        }
    };
    Ok(bar)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Unpacks a gzip'd tarball into `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    tar::Archive::new(GzDecoder::new(BufReader::new(file)))
        .unpack(dest)
        .with_context(|| format!("failed to extract {}", archive.display()))?;
    info!("extracted {} into {}", archive.display(), dest.display());
    Ok(())
}
