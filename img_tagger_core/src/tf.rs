use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use tensorflow::{
    Graph, ImportGraphDefOptions, Operation, Session, SessionOptions, SessionRunArgs,
    Tensor as TfTensor,
};
use tracing::{debug, info};

use crate::model::Classifier;

// Output 0 of the JPEG decoder holds the decoded uint8 [height, width, 3]
// image; feeding it directly skips in-graph decoding.
const INPUT_OP: &str = "DecodeJpeg";
// Normalized prediction across the 1008 output nodes.
const OUTPUT_OP: &str = "softmax";

/// Inception graph imported from a frozen GraphDef, with one open session.
pub struct TfClassifier {
    session: Session,
    input: Operation,
    output: Operation,
}

impl TfClassifier {
    pub fn load(graph_path: &Path) -> Result<Self> {
        let proto = std::fs::read(graph_path)
            .with_context(|| format!("failed to read {}", graph_path.display()))?;

        let mut graph = Graph::new();
        graph
            .import_graph_def(&proto, &ImportGraphDefOptions::new())
            .with_context(|| format!("failed to import {}", graph_path.display()))?;
        let session = Session::new(&SessionOptions::new(), &graph)?;
        let input = graph.operation_by_name_required(INPUT_OP)?;
        let output = graph.operation_by_name_required(OUTPUT_OP)?;
        info!("graph imported from {}", graph_path.display());

        Ok(Self {
            session,
            input,
            output,
        })
    }
}

impl Classifier for TfClassifier {
    fn classify(&mut self, image: &[u8]) -> Result<Tensor> {
        let img = image::load_from_memory(image)?.to_rgb8();
        let (width, height) = img.dimensions();
        let pixels = TfTensor::<u8>::new(&[height as u64, width as u64, 3])
            .with_values(&img.into_raw())?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&self.input, 0, &pixels);
        let token = args.request_fetch(&self.output, 0);

        let start = std::time::Instant::now();
        self.session.run(&mut args)?;
        debug!("forward costs:{:?}", start.elapsed());

        let scores: TfTensor<f32> = args.fetch(token)?;
        let dims: Vec<usize> = scores.dims().iter().map(|&d| d as usize).collect();
        Ok(Tensor::from_slice(&scores[..], dims, &Device::Cpu)?)
    }
}
