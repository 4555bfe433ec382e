//! Types shared by the preprocessor, the inference provider and the
//! postprocessor.
//!
//! A [`Tensor`] travels from the preprocessor into the inference provider, the
//! provider answers with a [`Prediction`], and every stage reports failures
//! through the [`MlError`] taxonomy.

mod error;
mod tensor;

pub use error::{MlError, MlResult};
pub use tensor::Tensor;

use serde::{Deserialize, Serialize};

/// Arg-max of a classifier's output vector together with its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: usize,
    pub confidence: f32,
}

/// One entry of a ranked classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub index: usize,
    pub label: String,
    pub probability: f32,
}

pub type Classifications = Vec<Classification>;
