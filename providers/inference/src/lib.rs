//! Classifier adapter: loads a pretrained model artifact once, warms it up
//! and answers `predict` calls with the arg-max class and its probability.

pub mod config;
pub mod data_loader;
pub mod engine;
pub mod provider;

pub use crate::config::ProviderConfig;
pub use crate::data_loader::{ModelMetadata, ModelRawData};
pub use crate::engine::{
    Engine, ExecutionTarget, Graph, GraphEncoding, InferenceEngine, InferenceError,
    InferenceResult, OutputActivation, TractEngine,
};
pub use crate::provider::{InferenceProvider, LoadedModel};
pub use mltypes::{MlError, Prediction, Tensor};
