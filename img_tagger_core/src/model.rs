use std::path::Path;

use anyhow::Result;
use candle_core::{DType, Tensor};

/// Serialized GraphDef shipped in the model archive.
pub const GRAPH_FILE: &str = "classify_image_graph_def.pb";

/// Whether this build can run the model at all.
pub const HAS_BACKEND: bool = cfg!(feature = "tensorflow");

/// An image classifier that scores raw, still encoded, image bytes.
pub trait Classifier {
    /// Returns one score per class. Leading unit dimensions are allowed,
    /// e.g. `[1, 1008]`.
    fn classify(&mut self, image: &[u8]) -> Result<Tensor>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&mut self, image: &[u8]) -> Result<Tensor> {
        (**self).classify(image)
    }
}

/// The `k` best `(class index, score)` pairs, highest score first.
///
/// Equal scores keep ascending class index order. Fewer than `k` pairs are
/// returned when the model has fewer classes.
pub fn top_k(scores: &Tensor, k: usize) -> Result<Vec<(usize, f32)>> {
    let scores = scores.flatten_all()?.to_dtype(DType::F32)?;
    if scores.elem_count() == 0 {
        return Ok(vec![]);
    }
    let order = scores.arg_sort_last_dim(false)?.to_vec1::<u32>()?;
    let values = scores.to_vec1::<f32>()?;
    Ok(order
        .into_iter()
        .take(k)
        .map(|idx| (idx as usize, values[idx as usize]))
        .collect())
}

/// Opens the inference session for the graph stored in `model_dir`.
#[cfg(feature = "tensorflow")]
pub fn load_classifier(model_dir: &Path) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(crate::tf::TfClassifier::load(&model_dir.join(GRAPH_FILE))?))
}

#[cfg(not(feature = "tensorflow"))]
pub fn load_classifier(model_dir: &Path) -> Result<Box<dyn Classifier>> {
    anyhow::bail!(
        "cannot run {}: built without the `tensorflow` feature",
        model_dir.join(GRAPH_FILE).display()
    )
}
