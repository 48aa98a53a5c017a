//! Classifier model loading and inference.
//!
//! Wraps an ONNX Runtime session behind the narrow vector-in/vector-out interface the
//! classification session needs: a fixed-length feature vector goes in, one raw score
//! per label comes out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::bail;
use ndarray::{Array2, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};

use crate::classify::InferenceEngine;
use crate::iter::zip_exact;

fn environment() -> &'static Arc<Environment> {
    static ENV: OnceLock<Arc<Environment>> = OnceLock::new();
    ENV.get_or_init(|| {
        Environment::builder()
            .with_name("handsign")
            .build()
            .expect("failed to initialize ONNX runtime")
            .into_arc()
    })
}

/// Neural network loader.
pub struct Loader {
    path: PathBuf,
    num_threads: Option<usize>,
}

impl Loader {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            num_threads: None,
        }
    }

    /// Sets the number of worker threads the session may use internally.
    ///
    /// By default the runtime picks a thread count on its own.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Loads and prepares the network.
    ///
    /// Returns an error if the model file is missing or malformed, or if the model is not
    /// a plain vector-to-vector classifier (exactly one input and one output, both with
    /// fully known shapes).
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let mut builder = SessionBuilder::new(environment())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(num_threads) = self.num_threads {
            builder = builder.with_intra_threads(num_threads as i16)?;
        }
        let session = builder.with_model_from_file(&self.path)?;

        if session.inputs.len() != 1 {
            bail!(
                "classifier model has to take exactly 1 input, this one takes {}",
                session.inputs.len()
            );
        }
        if session.outputs.len() != 1 {
            bail!(
                "classifier model has to produce exactly 1 output, this one produces {}",
                session.outputs.len()
            );
        }
        let input_len = vector_len(&session.inputs[0].dimensions)?;
        let output_len = vector_len(&session.outputs[0].dimensions)?;

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            session,
            path: self.path,
            input_len,
            output_len,
        })))
    }
}

/// Flattens a tensor shape to a vector length.
///
/// A leading batch dimension of 1 is tolerated (it multiplies the length by 1); dynamic
/// dimensions are rejected since the classifier needs fixed-width vectors.
fn vector_len(dimensions: &[Option<u32>]) -> anyhow::Result<usize> {
    let mut len = 1usize;
    for dim in dimensions {
        match dim {
            Some(dim) => len *= *dim as usize,
            None => bail!("model tensor has dynamic shape {:?}", dimensions),
        }
    }
    Ok(len)
}

/// A loaded classifier model.
///
/// This is a cheaply [`Clone`]able handle to the underlying session.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    session: Session,
    path: PathBuf,
    input_len: usize,
    output_len: usize,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension. In the future, other model formats may be
    /// supported.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Loader> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network file must have `.onnx` extension"),
        }
        Ok(Loader::new(path.to_owned()))
    }

    /// Width of the feature vector the model consumes.
    pub fn input_len(&self) -> usize {
        self.0.input_len
    }

    /// Number of per-label scores the model produces.
    pub fn output_len(&self) -> usize {
        self.0.output_len
    }

    /// Runs the network on `features`, writing one raw score per label into `scores`.
    ///
    /// Both slices must match the model's input and output widths; mismatches are
    /// configuration errors.
    pub fn infer(&self, features: &[f32], scores: &mut [f32]) -> anyhow::Result<()> {
        if features.len() != self.0.input_len {
            bail!(
                "feature vector has {} values, model expects {}",
                features.len(),
                self.0.input_len
            );
        }
        if scores.len() != self.0.output_len {
            bail!(
                "score buffer has {} entries, model produces {}",
                scores.len(),
                self.0.output_len
            );
        }

        let input =
            CowArray::from(Array2::from_shape_vec((1, features.len()), features.to_vec())?)
                .into_dyn();
        let value = Value::from_array(self.0.session.allocator(), &input)?;
        let outputs = self.0.session.run(vec![value])?;
        let tensor: OrtOwnedTensor<'_, f32, _> = outputs[0].try_extract()?;
        let view = tensor.view();
        for (cell, &score) in zip_exact(&mut *scores, view.iter()) {
            *cell = score;
        }
        Ok(())
    }
}

impl InferenceEngine for NeuralNetwork {
    fn num_features(&self) -> usize {
        self.input_len()
    }

    fn num_labels(&self) -> usize {
        self.output_len()
    }

    fn infer(&self, features: &[f32], scores: &mut [f32]) -> anyhow::Result<()> {
        NeuralNetwork::infer(self, features, scores)
    }

    fn reconfigure(self, num_threads: usize) -> anyhow::Result<Self> {
        let loader = NeuralNetwork::from_path(&self.0.path)?.with_num_threads(num_threads);
        // Release the old session before building its replacement.
        drop(self);
        loader.load()
    }
}
