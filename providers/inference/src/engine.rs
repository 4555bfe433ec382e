mod tract;

pub use self::tract::TractEngine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::data_loader::{DataLoaderError, ModelMetadata};
use mltypes::Tensor;

/// Graph (model number)
pub type Graph = u32;

pub type Engine = Arc<dyn InferenceEngine + Send + Sync>;

/// GraphEncoding
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEncoding {
    #[default]
    Onnx,
    TfLite,
    Tensorflow,
}

impl FromStr for GraphEncoding {
    type Err = DataLoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(GraphEncoding::Onnx),
            "tflite" => Ok(GraphEncoding::TfLite),
            "tensorflow" => Ok(GraphEncoding::Tensorflow),
            _ => Err(DataLoaderError::ModelLoaderMetadataError(format!(
                "Invalid graph encoding: '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for GraphEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphEncoding::Onnx => "onnx",
            GraphEncoding::TfLite => "tflite",
            GraphEncoding::Tensorflow => "tensorflow",
        };
        f.write_str(name)
    }
}

/// ExecutionTarget
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    #[default]
    Cpu,
    Gpu,
    Npu,
    Tpu,
}

impl FromStr for ExecutionTarget {
    type Err = DataLoaderError;

    fn from_str(et: &str) -> Result<Self, Self::Err> {
        match et.to_lowercase().as_str() {
            "cpu" => Ok(ExecutionTarget::Cpu),
            "tpu" => Ok(ExecutionTarget::Tpu),
            "gpu" => Ok(ExecutionTarget::Gpu),
            "npu" => Ok(ExecutionTarget::Npu),
            _ => {
                log::warn!(
                    "invalid or missing execution target detected: '{}' - defaults to cpu",
                    et,
                );

                Ok(ExecutionTarget::Cpu)
            }
        }
    }
}

/// Last step of the graph.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// The graph already emits probabilities.
    #[default]
    Softmax,
    /// The graph emits raw scores, softmax is applied after inference.
    Logits,
}

impl FromStr for OutputActivation {
    type Err = DataLoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "softmax" => Ok(OutputActivation::Softmax),
            "logits" => Ok(OutputActivation::Logits),
            _ => {
                log::warn!(
                    "invalid or missing output activation detected: '{}' - defaults to softmax",
                    s,
                );

                Ok(OutputActivation::Softmax)
            }
        }
    }
}

/// InferenceEngine
///
/// An engine owns the graphs it loaded. A [`Graph`] handle stays valid until
/// [`InferenceEngine::drop_model_state`] is called for it.
pub trait InferenceEngine {
    fn load(&self, model: &[u8], metadata: &ModelMetadata) -> InferenceResult<Graph>;

    /// Runs one forward pass and returns the flattened first output.
    fn compute(&self, graph: Graph, tensor: &Tensor) -> InferenceResult<Vec<f32>>;

    fn drop_model_state(&self, graph: &Graph);
}

/// Picks the engine able to execute `encoding`.
pub fn engine_for(encoding: &GraphEncoding) -> InferenceResult<Engine> {
    log::debug!("engine_for() - encoding: {:?}", &encoding);

    match encoding {
        GraphEncoding::Onnx | GraphEncoding::Tensorflow => Ok(Arc::new(TractEngine::default())),
        _ => {
            log::error!(
                "engine_for() - unsupported graph encoding detected '{:?}'",
                &encoding
            );
            Err(InferenceError::InvalidEncodingError(*encoding))
        }
    }
}

/// InferenceResult
pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("runtime error: {0}")]
    RuntimeError(String),

    #[error("Unsupported ExecutionTarget {0:?}")]
    UnsupportedExecutionTarget(ExecutionTarget),

    #[error("Invalid encoding {0}")]
    InvalidEncodingError(GraphEncoding),

    #[error("Failed to build model from buffer: {0}")]
    FailedToBuildModelFromBuffer(String),

    #[error("Graph {0} is not loaded")]
    GraphNotFound(Graph),

    #[error("Corrupt input tensor: {0}")]
    CorruptInputTensor(String),

    #[error("Re-shaping of tensor failed {0}")]
    ReShapeError(String),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] DataLoaderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_parse_case_insensitively() {
        assert_eq!("ONNX".parse::<GraphEncoding>().unwrap(), GraphEncoding::Onnx);
        assert_eq!(
            "tensorflow".parse::<GraphEncoding>().unwrap(),
            GraphEncoding::Tensorflow
        );
        assert!("keras".parse::<GraphEncoding>().is_err());
        assert!("openvino".parse::<GraphEncoding>().is_err());
        assert_eq!(GraphEncoding::Tensorflow.to_string(), "tensorflow");
    }

    #[test]
    fn unknown_targets_and_activations_fall_back() {
        assert_eq!("".parse::<ExecutionTarget>().unwrap(), ExecutionTarget::Cpu);
        assert_eq!("GPU".parse::<ExecutionTarget>().unwrap(), ExecutionTarget::Gpu);
        assert_eq!("".parse::<OutputActivation>().unwrap(), OutputActivation::Softmax);
        assert_eq!(
            "Logits".parse::<OutputActivation>().unwrap(),
            OutputActivation::Logits
        );
    }

    #[test]
    fn only_tract_encodings_have_an_engine() {
        assert!(engine_for(&GraphEncoding::Onnx).is_ok());
        assert!(engine_for(&GraphEncoding::Tensorflow).is_ok());
        assert!(matches!(
            engine_for(&GraphEncoding::TfLite),
            Err(InferenceError::InvalidEncodingError(GraphEncoding::TfLite))
        ));
    }
}
