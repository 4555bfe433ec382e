//! Deterministic stand-in for a trained classifier.
//!
//! The "model artifact" is a JSON document listing one RGB prototype per
//! class. Inference averages the input tensor's pixels and scores every class
//! by its squared distance to that mean:
//! `softmax(-|mean - prototype_i|^2 / temperature)`.
//! An image filled with a prototype's color is therefore classified as that
//! prototype's class with near certainty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use inference::{Graph, InferenceEngine, InferenceError, InferenceResult, ModelMetadata};
use leafpostprocessor::softmax;
use mltypes::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeModel {
    pub prototypes: Vec<[f32; 3]>,
    pub temperature: f32,
    /// Emit the raw scores instead of probabilities.
    #[serde(default)]
    pub emit_logits: bool,
}

impl FakeModel {
    /// One well separated color per leaf class, index-aligned with the
    /// builtin catalog. Index 3 ("Healthy Apple") is leaf green.
    pub fn leaf_classes() -> Self {
        FakeModel {
            prototypes: vec![
                [40.0, 40.0, 40.0],
                [200.0, 40.0, 40.0],
                [230.0, 140.0, 20.0],
                [40.0, 200.0, 40.0],
                [140.0, 90.0, 40.0],
                [40.0, 40.0, 200.0],
                [200.0, 200.0, 200.0],
            ],
            temperature: 500.0,
            emit_logits: false,
        }
    }

    pub fn to_json(&self) -> String {
        // a struct of floats and bools always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    fn scores(&self, tensor: &Tensor) -> InferenceResult<Vec<f32>> {
        if tensor.shape().last() != Some(&3) || tensor.is_empty() {
            return Err(InferenceError::CorruptInputTensor(format!(
                "expected an RGB tensor, got shape {:?}",
                tensor.shape()
            )));
        }

        let pixels = (tensor.len() / 3) as f32;
        let mut mean = [0.0f32; 3];
        for pixel in tensor.data().chunks(3) {
            for (m, v) in mean.iter_mut().zip(pixel) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= pixels);

        let logits: Vec<f32> = self
            .prototypes
            .iter()
            .map(|p| {
                let distance: f32 = p.iter().zip(&mean).map(|(a, b)| (a - b).powi(2)).sum();
                -distance / self.temperature
            })
            .collect();

        Ok(if self.emit_logits {
            logits
        } else {
            softmax(&logits)
        })
    }
}

/// Engine executing [`FakeModel`]s; counts loads and forward passes.
#[derive(Default)]
pub struct FakeEngine {
    load_delay: Option<Duration>,
    loads: AtomicUsize,
    computes: AtomicUsize,
    next_graph: AtomicU32,
    graphs: RwLock<HashMap<Graph, FakeModel>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every load take at least `delay`, widening race windows in tests.
    pub fn with_load_delay(delay: Duration) -> Self {
        FakeEngine {
            load_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn computes(&self) -> usize {
        self.computes.load(Ordering::SeqCst)
    }

    pub fn loaded_graphs(&self) -> usize {
        self.graphs.read().map(|g| g.len()).unwrap_or(0)
    }
}

impl InferenceEngine for FakeEngine {
    fn load(&self, model: &[u8], metadata: &ModelMetadata) -> InferenceResult<Graph> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let fake: FakeModel = serde_json::from_slice(model)
            .map_err(|e| InferenceError::FailedToBuildModelFromBuffer(e.to_string()))?;

        let graph = self.next_graph.fetch_add(1, Ordering::SeqCst);
        debug!(
            "fake graph {} with {} classes for {:?}",
            graph,
            fake.prototypes.len(),
            metadata.model_name
        );

        self.graphs
            .write()
            .map_err(|e| InferenceError::RuntimeError(e.to_string()))?
            .insert(graph, fake);

        Ok(graph)
    }

    fn compute(&self, graph: Graph, tensor: &Tensor) -> InferenceResult<Vec<f32>> {
        self.computes.fetch_add(1, Ordering::SeqCst);

        let graphs = self
            .graphs
            .read()
            .map_err(|e| InferenceError::RuntimeError(e.to_string()))?;

        graphs
            .get(&graph)
            .ok_or(InferenceError::GraphNotFound(graph))?
            .scores(tensor)
    }

    fn drop_model_state(&self, graph: &Graph) {
        if let Ok(mut graphs) = self.graphs.write() {
            graphs.remove(graph);
        }
    }
}

/// Tensor of shape `[1, height, width, 3]` filled with one color.
pub fn uniform_tensor(height: usize, width: usize, rgb: [f32; 3]) -> Tensor {
    let data = rgb.iter().copied().cycle().take(height * width * 3).collect();

    // element count matches the shape by construction
    Tensor::new(vec![1, height, width, 3], data).unwrap_or_else(|_| Tensor::zeros(&[1, height, width, 3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototype_color_wins_with_high_confidence() {
        let model = FakeModel::leaf_classes();

        for (index, prototype) in model.prototypes.iter().enumerate() {
            let scores = model.scores(&uniform_tensor(4, 4, *prototype)).unwrap();
            let best = leafpostprocessor::arg_max(&scores).unwrap();

            assert_eq!(best.class_index, index);
            assert!(best.confidence > 0.9);
        }
    }

    #[test]
    fn rejects_non_rgb_tensors() {
        let model = FakeModel::leaf_classes();

        assert!(model.scores(&Tensor::zeros(&[1, 3, 4, 4])).is_err());
    }
}
