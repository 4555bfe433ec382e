use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tract_onnx::prelude::*;
use tract_onnx::prelude::{Graph as TractGraph, Tensor as TractTensor};

use super::{ExecutionTarget, Graph, GraphEncoding, InferenceEngine, InferenceError, InferenceResult};
use crate::data_loader::ModelMetadata;
use mltypes::Tensor;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TractGraph<TypedFact, Box<dyn TypedOp>>>;

/// CPU engine backed by tract, executes ONNX and frozen TensorFlow graphs.
#[derive(Default)]
pub struct TractEngine {
    next_graph: AtomicU32,
    plans: RwLock<HashMap<Graph, Arc<TractPlan>>>,
}

impl TractEngine {
    fn parse(encoding: GraphEncoding, model: &[u8]) -> InferenceResult<InferenceModel> {
        let mut cursor = Cursor::new(model);

        let parsed = match encoding {
            GraphEncoding::Onnx => tract_onnx::onnx().model_for_read(&mut cursor),
            GraphEncoding::Tensorflow => tract_tensorflow::tensorflow().model_for_read(&mut cursor),
            other => return Err(InferenceError::InvalidEncodingError(other)),
        };

        parsed.map_err(|e| InferenceError::FailedToBuildModelFromBuffer(e.to_string()))
    }

    fn plan(&self, graph: Graph) -> InferenceResult<Arc<TractPlan>> {
        let plans = self
            .plans
            .read()
            .map_err(|e| InferenceError::RuntimeError(e.to_string()))?;

        plans
            .get(&graph)
            .cloned()
            .ok_or(InferenceError::GraphNotFound(graph))
    }
}

impl InferenceEngine for TractEngine {
    fn load(&self, model: &[u8], metadata: &ModelMetadata) -> InferenceResult<Graph> {
        let encoding = GraphEncoding::from_str(&metadata.graph_encoding)?;
        let target = ExecutionTarget::from_str(&metadata.execution_target)?;

        if target != ExecutionTarget::Cpu {
            log::error!("load() - tract runs on the cpu only, requested {:?}", target);
            return Err(InferenceError::UnsupportedExecutionTarget(target));
        }

        let shape = metadata.input_shape();
        log::debug!(
            "load() - parsing {} graph of {} bytes with input shape {:?}",
            encoding,
            model.len(),
            shape
        );

        let plan = Self::parse(encoding, model)?
            .with_input_fact(0, f32::fact(shape.clone()).into())
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| InferenceError::FailedToBuildModelFromBuffer(e.to_string()))?;

        let graph = self.next_graph.fetch_add(1, Ordering::SeqCst);

        self.plans
            .write()
            .map_err(|e| InferenceError::RuntimeError(e.to_string()))?
            .insert(graph, Arc::new(plan));

        log::debug!("load() - registered graph {}", graph);

        Ok(graph)
    }

    fn compute(&self, graph: Graph, tensor: &Tensor) -> InferenceResult<Vec<f32>> {
        let plan = self.plan(graph)?;

        let input = tract_ndarray::ArrayD::from_shape_vec(
            tract_ndarray::IxDyn(tensor.shape()),
            tensor.data().to_vec(),
        )
        .map_err(|e| InferenceError::ReShapeError(e.to_string()))?;

        let outputs = plan
            .run(tvec!(TractTensor::from(input).into()))
            .map_err(|e| InferenceError::RuntimeError(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::RuntimeError("model produced no outputs".to_string()))?;

        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::RuntimeError(format!("output is not f32: {}", e)))?;

        Ok(view.iter().copied().collect())
    }

    fn drop_model_state(&self, graph: &Graph) {
        match self.plans.write() {
            Ok(mut plans) => {
                if plans.remove(graph).is_some() {
                    log::debug!("drop_model_state() - released graph {}", graph);
                }
            }
            Err(e) => log::error!("drop_model_state() - graph table poisoned: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(encoding: &str, target: &str) -> ModelMetadata {
        ModelMetadata {
            model_name: None,
            graph_encoding: encoding.to_string(),
            execution_target: target.to_string(),
            tensor_shape_in: None,
            tensor_shape_out: None,
            pixel_scale: String::new(),
            output_activation: String::new(),
        }
    }

    #[test]
    fn garbage_is_not_a_model() {
        let engine = TractEngine::default();

        let onnx = engine.load(b"this is not protobuf", &metadata("onnx", "cpu"));
        assert!(matches!(onnx, Err(InferenceError::FailedToBuildModelFromBuffer(_))));

        let tf = engine.load(&[0xff; 64], &metadata("tensorflow", ""));
        assert!(matches!(tf, Err(InferenceError::FailedToBuildModelFromBuffer(_))));
    }

    #[test]
    fn only_cpu_is_supported() {
        let engine = TractEngine::default();

        let result = engine.load(&[], &metadata("onnx", "tpu"));

        assert!(matches!(
            result,
            Err(InferenceError::UnsupportedExecutionTarget(ExecutionTarget::Tpu))
        ));
    }

    #[test]
    fn tflite_is_rejected() {
        let engine = TractEngine::default();

        assert!(matches!(
            engine.load(&[], &metadata("tflite", "cpu")),
            Err(InferenceError::InvalidEncodingError(GraphEncoding::TfLite))
        ));
    }

    #[test]
    fn unknown_graph_cannot_run() {
        let engine = TractEngine::default();

        let result = engine.compute(42, &Tensor::zeros(&[1, 128, 128, 3]));

        assert!(matches!(result, Err(InferenceError::GraphNotFound(42))));
        engine.drop_model_state(&42);
    }
}
