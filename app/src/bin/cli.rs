use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use img_tagger_core::resource::DATA_URL;
use img_tagger_core::Config;
use serde::Deserialize;
use tracing::info;

/// Classify every image under a directory and write the top labels next to
/// its relative path.
#[derive(Parser, Debug, Default)]
#[command(version, about)]
struct Args {
    /// Image root directory
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Pattern selecting images below the root (eg. **/250/*.jpg)
    #[arg(long)]
    path_pattern: Option<String>,

    /// Directory where classification files are written
    #[arg(long)]
    dest_dir: Option<PathBuf>,

    /// Directory holding classify_image_graph_def.pb and its label maps;
    /// the model is downloaded here when missing
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Display this many predictions [default: 5]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    num_top_predictions: Option<u32>,

    /// Reclassify images that already have a classification file
    #[arg(long)]
    overwrite: bool,

    /// Where to fetch the model archive from
    #[arg(long)]
    model_url: Option<String>,

    /// TOML file providing defaults for any of the options above
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    root_dir: Option<PathBuf>,
    path_pattern: Option<String>,
    dest_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    num_top_predictions: Option<u32>,
    overwrite: Option<bool>,
    model_url: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Command line values win over the file.
fn merge(args: Args, file: FileConfig) -> anyhow::Result<Config> {
    let root_dir = args
        .root_dir
        .or(file.root_dir)
        .ok_or_else(|| anyhow::format_err!("--root-dir is required"))?;
    let path_pattern = args
        .path_pattern
        .or(file.path_pattern)
        .ok_or_else(|| anyhow::format_err!("--path-pattern is required"))?;
    let dest_dir = args
        .dest_dir
        .or(file.dest_dir)
        .ok_or_else(|| anyhow::format_err!("--dest-dir is required"))?;
    let model_dir = args
        .model_dir
        .or(file.model_dir)
        .ok_or_else(|| anyhow::format_err!("--model-dir is required"))?;
    let num_top_predictions = args.num_top_predictions.or(file.num_top_predictions).unwrap_or(5);
    anyhow::ensure!(num_top_predictions > 0, "num_top_predictions must be at least 1");

    Ok(Config {
        root_dir: expand_home(root_dir),
        path_pattern,
        dest_dir: expand_home(dest_dir),
        model_dir: expand_home(model_dir),
        num_top_predictions: num_top_predictions as usize,
        overwrite: args.overwrite || file.overwrite.unwrap_or(false),
        model_url: args
            .model_url
            .or(file.model_url)
            .unwrap_or_else(|| DATA_URL.to_string()),
    })
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path,
    }
}

pub fn main() -> anyhow::Result<()> {
    std::env::set_var("RUST_BACKTRACE", "full");
    let mut args = Args::parse();
    tracing_subscriber::fmt::init();

    let file = match args.config.take() {
        Some(path) => FileConfig::read(&path)?,
        None => FileConfig::default(),
    };
    let config = merge(args, file)?;

    let summary = img_tagger_core::run(&config)?;
    info!(
        "done: {} classified, {} skipped, reports in {}",
        summary.classified,
        summary.skipped,
        config.dest_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_args() -> Args {
        Args::parse_from([
            "cli",
            "--root-dir",
            "/photos",
            "--path-pattern",
            "**/250/*.jpg",
            "--dest-dir",
            "/out",
            "--model-dir",
            "/models",
        ])
    }

    #[test]
    fn cli_only() {
        let config = merge(full_args(), FileConfig::default()).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/photos"));
        assert_eq!(config.path_pattern, "**/250/*.jpg");
        assert_eq!(config.num_top_predictions, 5);
        assert!(!config.overwrite);
        assert_eq!(config.model_url, DATA_URL);
    }

    #[test]
    fn file_fills_missing_values() {
        let file: FileConfig = toml::from_str(
            r#"
            root_dir = "/from-file"
            path_pattern = "*.png"
            dest_dir = "/file-out"
            model_dir = "/file-models"
            num_top_predictions = 3
            overwrite = true
            "#,
        )
        .unwrap();
        let config = merge(Args::default(), file).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/from-file"));
        assert_eq!(config.path_pattern, "*.png");
        assert_eq!(config.num_top_predictions, 3);
        assert!(config.overwrite);
    }

    #[test]
    fn cli_wins_over_file() {
        let file = FileConfig {
            root_dir: Some("/from-file".into()),
            num_top_predictions: Some(3),
            ..Default::default()
        };
        let mut args = full_args();
        args.num_top_predictions = Some(7);
        let config = merge(args, file).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/photos"));
        assert_eq!(config.num_top_predictions, 7);
    }

    #[test]
    fn missing_required_value() {
        let err = merge(Args::default(), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--root-dir"), "{err}");
    }

    #[test]
    fn zero_predictions_rejected() {
        assert!(Args::try_parse_from(["cli", "--num-top-predictions", "0"]).is_err());

        let file = FileConfig {
            num_top_predictions: Some(0),
            ..Default::default()
        };
        assert!(merge(full_args(), file).is_err());
    }

    #[test]
    fn unknown_file_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("rootdir = \"/x\"").is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_home(PathBuf::from("~/models")),
            PathBuf::from("/home/tester/models")
        );
        assert_eq!(expand_home(PathBuf::from("/abs")), PathBuf::from("/abs"));
    }
}
