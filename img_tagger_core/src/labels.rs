use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Protobuf text file mapping integer node IDs to synset IDs.
pub const LABEL_MAP_FILE: &str = "imagenet_2012_challenge_label_map_proto.pbtxt";
/// Tab separated file mapping synset IDs to human readable strings.
pub const SYNSET_MAP_FILE: &str = "imagenet_synset_to_human_label_map.txt";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("file does not exist: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to locate synset {synset} (node {node_id})")]
    MissingSynset { node_id: i32, synset: String },
    #[error("{}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Converts integer node IDs to human readable labels.
#[derive(Debug, Default, Clone)]
pub struct NodeLookup {
    node_id_to_name: HashMap<i32, String>,
}

impl NodeLookup {
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, LookupError> {
        Self::load(
            &model_dir.join(LABEL_MAP_FILE),
            &model_dir.join(SYNSET_MAP_FILE),
        )
    }

    /// Joins node ID → synset with synset → human string.
    ///
    /// Fails on the first synset of the label map that has no human string.
    pub fn load(label_map_path: &Path, synset_map_path: &Path) -> Result<Self, LookupError> {
        let synset_text = read_required(synset_map_path)?;
        let label_text = read_required(label_map_path)?;

        let uid_to_human = parse_synset_map(&synset_text);
        let node_id_to_uid = parse_label_map(&label_text, label_map_path)?;

        let mut node_id_to_name = HashMap::with_capacity(node_id_to_uid.len());
        for (node_id, uid) in node_id_to_uid {
            let name = uid_to_human
                .get(uid.as_str())
                .ok_or_else(|| LookupError::MissingSynset {
                    node_id,
                    synset: uid.clone(),
                })?;
            node_id_to_name.insert(node_id, name.to_string());
        }
        debug!("loaded {} labels", node_id_to_name.len());
        Ok(Self { node_id_to_name })
    }

    /// Returns an empty string for IDs without a label.
    pub fn id_to_string(&self, node_id: i32) -> &str {
        self.node_id_to_name
            .get(&node_id)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.node_id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_id_to_name.is_empty()
    }
}

impl FromIterator<(i32, String)> for NodeLookup {
    fn from_iter<T: IntoIterator<Item = (i32, String)>>(iter: T) -> Self {
        Self {
            node_id_to_name: iter.into_iter().collect(),
        }
    }
}

fn read_required(path: &Path) -> Result<String, LookupError> {
    if !path.exists() {
        return Err(LookupError::MissingFile(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| LookupError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_synset_map(text: &str) -> HashMap<&str, &str> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim_end();
            let (uid, human) = line.split_once(|c: char| c.is_whitespace())?;
            Some((uid, human.trim_start()))
        })
        .filter(|(uid, _)| !uid.is_empty())
        .collect()
}

/// Pairs are kept in file order.
fn parse_label_map(text: &str, path: &Path) -> Result<Vec<(i32, String)>, LookupError> {
    let malformed = |line: usize, reason: String| LookupError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut pairs = vec![];
    let mut target_class = None;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("target_class:") {
            let value = value.trim();
            let id = value
                .parse::<i32>()
                .map_err(|e| malformed(idx + 1, format!("bad target_class {value:?}: {e}")))?;
            target_class = Some(id);
        } else if let Some(value) = line.strip_prefix("target_class_string:") {
            let id = target_class
                .take()
                .ok_or_else(|| malformed(idx + 1, "target_class_string without target_class".into()))?;
            pairs.push((id, value.trim().trim_matches('"').to_string()));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL_MAP: &str = r#"# -- label map --
entry {
  target_class: 449
  target_class_string: "n01440764"
}
entry {
  target_class: 450
  target_class_string: "n01443537"
}
"#;

    const SYNSETS: &str = "n00004475\torganism, being\n\
n01440764\ttench, Tinca tinca\n\
n01443537\tgoldfish, Carassius auratus  \n\n";

    fn write_bundle(dir: &Path, label_map: &str, synsets: &str) {
        std::fs::write(dir.join(LABEL_MAP_FILE), label_map).unwrap();
        std::fs::write(dir.join(SYNSET_MAP_FILE), synsets).unwrap();
    }

    #[test]
    fn joins_both_files() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), LABEL_MAP, SYNSETS);

        let lookup = NodeLookup::from_model_dir(dir.path()).unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.id_to_string(449), "tench, Tinca tinca");
        assert_eq!(lookup.id_to_string(450), "goldfish, Carassius auratus");
    }

    #[test]
    fn unknown_id_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), LABEL_MAP, SYNSETS);

        let lookup = NodeLookup::from_model_dir(dir.path()).unwrap();
        assert_eq!(lookup.id_to_string(0), "");
        assert_eq!(lookup.id_to_string(1007), "");
    }

    #[test]
    fn missing_synset_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), LABEL_MAP, "n01440764\ttench\n");

        let err = NodeLookup::from_model_dir(dir.path()).unwrap_err();
        match err {
            LookupError::MissingSynset { node_id, synset } => {
                assert_eq!(node_id, 450);
                assert_eq!(synset, "n01443537");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SYNSET_MAP_FILE), SYNSETS).unwrap();

        let err = NodeLookup::from_model_dir(dir.path()).unwrap_err();
        assert!(
            matches!(&err, LookupError::MissingFile(p) if p.ends_with(LABEL_MAP_FILE)),
            "{err}"
        );
    }

    #[test]
    fn class_string_needs_a_class() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(
            dir.path(),
            "entry {\n  target_class_string: \"n01440764\"\n}\n",
            SYNSETS,
        );

        let err = NodeLookup::from_model_dir(dir.path()).unwrap_err();
        assert!(matches!(err, LookupError::Malformed { line: 2, .. }), "{err}");
    }

    #[test]
    fn bad_class_number() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "  target_class: forty\n", SYNSETS);

        let err = NodeLookup::from_model_dir(dir.path()).unwrap_err();
        assert!(matches!(err, LookupError::Malformed { line: 1, .. }), "{err}");
    }
}
