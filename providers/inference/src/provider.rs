use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::data_loader::{self, ModelMetadata};
use crate::engine::{engine_for, Engine, Graph, GraphEncoding, OutputActivation};
use leafpostprocessor::{arg_max, check_probabilities, classify, softmax, Catalog, CLASS_COUNT};
use mltypes::{Classifications, MlError, MlResult, Prediction, Tensor};

/// A model that has been loaded into an engine and warmed up.
///
/// Immutable; shared by every prediction of the owning provider.
pub struct LoadedModel {
    metadata: ModelMetadata,
    engine: Engine,
    graph: Graph,
    input_shape: Vec<usize>,
    activation: OutputActivation,
}

impl LoadedModel {
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Throwaway forward pass on a zero tensor right after loading.
    ///
    /// The only thing taken from the result is its length: a model that does
    /// not emit one value per label can never be used.
    fn warmup(&self) -> MlResult<()> {
        let zeros = Tensor::zeros(&self.input_shape);

        let output = self
            .engine
            .compute(self.graph, &zeros)
            .map_err(|e| MlError::ModelLoadError(format!("warmup inference failed: {}", e)))?;

        if output.len() != CLASS_COUNT {
            return Err(MlError::ModelLoadError(format!(
                "model emits {} values but the label set has {}",
                output.len(),
                CLASS_COUNT
            )));
        }

        debug!("warmup inference finished");
        Ok(())
    }

    /// Full output vector as probabilities.
    ///
    /// An output of the wrong length is a [`MlError::ModelLoadError`]: the
    /// model does not fit the label set and must not be used again.
    pub fn probabilities(&self, tensor: &Tensor) -> MlResult<Vec<f32>> {
        if tensor.shape() != self.input_shape.as_slice() {
            return Err(MlError::InferenceError(format!(
                "tensor of shape {:?} does not match model input {:?}",
                tensor.shape(),
                self.input_shape
            )));
        }

        let output = self
            .engine
            .compute(self.graph, tensor)
            .map_err(|e| MlError::InferenceError(e.to_string()))?;

        // the model no longer matches the label set; not recoverable
        if output.len() != CLASS_COUNT {
            error!(
                "probabilities() - model returned {} values instead of {}",
                output.len(),
                CLASS_COUNT
            );
            return Err(MlError::ModelLoadError(format!(
                "model emits {} values but the label set has {}",
                output.len(),
                CLASS_COUNT
            )));
        }

        let probabilities = match self.activation {
            OutputActivation::Softmax => output,
            OutputActivation::Logits => softmax(&output),
        };

        check_probabilities(&probabilities)?;

        Ok(probabilities)
    }

    pub fn predict(&self, tensor: &Tensor) -> MlResult<Prediction> {
        let probabilities = self.probabilities(tensor)?;

        arg_max(&probabilities)
            .ok_or_else(|| MlError::InferenceError("empty output vector".to_string()))
    }
}

impl Drop for LoadedModel {
    fn drop(&mut self) {
        self.engine.drop_model_state(&self.graph);
    }
}

/// Classifier adapter.
///
/// The model artifact is loaded lazily by the first call that needs it and
/// at most once per provider, even when several threads race for it. A failed
/// load is remembered as well: the provider then answers every call with the
/// same [`MlError::ModelLoadError`]. The same holds for a loaded model that
/// later answers with an output vector of the wrong length.
pub struct InferenceProvider {
    config: ProviderConfig,

    /// Engine forced by the caller; otherwise chosen from the graph encoding.
    engine: Option<Engine>,

    model: OnceLock<MlResult<Arc<LoadedModel>>>,

    /// First fatal error raised by the loaded model.
    poisoned: OnceLock<MlError>,
}

impl InferenceProvider {
    pub fn new(config: ProviderConfig) -> Self {
        InferenceProvider {
            config,
            engine: None,
            model: OnceLock::new(),
            poisoned: OnceLock::new(),
        }
    }

    pub fn with_engine(config: ProviderConfig, engine: Engine) -> Self {
        InferenceProvider {
            config,
            engine: Some(engine),
            model: OnceLock::new(),
            poisoned: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.poisoned.get().is_none() && matches!(self.model.get(), Some(Ok(_)))
    }

    /// The cached model, loading it on first use.
    pub fn model(&self) -> MlResult<Arc<LoadedModel>> {
        if let Some(e) = self.poisoned.get() {
            return Err(e.clone());
        }
        self.model.get_or_init(|| self.load_model()).clone()
    }

    /// Remembers a fatal error so that every later call fails with it.
    fn poison_on_fatal<T>(&self, result: MlResult<T>) -> MlResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                let first = self.poisoned.get_or_init(|| e.clone());
                error!("model disabled: {}", first);
                return Err(first.clone());
            }
        }
        result
    }

    fn load_model(&self) -> MlResult<Arc<LoadedModel>> {
        let path = self.config.model_path();
        info!("loading model from '{}'", path.display());

        let model_data =
            data_loader::load_model(&path).map_err(|e| model_load_error(e.to_string()))?;
        let metadata = model_data.metadata;

        let graph_encoding = GraphEncoding::from_str(&metadata.graph_encoding)
            .map_err(|e| model_load_error(e.to_string()))?;

        let activation = OutputActivation::from_str(&metadata.output_activation)
            .map_err(|e| model_load_error(e.to_string()))?;

        if let Some(len) = metadata.output_len() {
            if len != CLASS_COUNT {
                return Err(model_load_error(format!(
                    "metadata declares {} outputs but the label set has {}",
                    len, CLASS_COUNT
                )));
            }
        }

        let engine = match &self.engine {
            Some(engine) => Arc::clone(engine),
            None => engine_for(&graph_encoding).map_err(|e| model_load_error(e.to_string()))?,
        };

        let graph = engine
            .load(&model_data.model, &metadata)
            .map_err(|e| model_load_error(e.to_string()))?;

        let model = LoadedModel {
            input_shape: metadata.input_shape(),
            metadata,
            engine,
            graph,
            activation,
        };

        model.warmup().inspect_err(|e| error!("{}", e))?;

        info!(
            "model '{}' ready, input shape {:?}",
            model.metadata.model_name.as_deref().unwrap_or("unnamed"),
            model.input_shape
        );

        Ok(Arc::new(model))
    }

    /// Arg-max class of `tensor` and its probability.
    pub fn predict(&self, tensor: &Tensor) -> MlResult<Prediction> {
        let model = self.model()?;
        let prediction = self.poison_on_fatal(model.predict(tensor))?;

        debug!(
            "predict() - class {} with confidence {}",
            prediction.class_index, prediction.confidence
        );

        Ok(prediction)
    }

    /// The `k` most likely classes of `tensor`, labelled from `catalog`.
    pub fn classify(&self, tensor: &Tensor, catalog: &Catalog, k: usize) -> MlResult<Classifications> {
        let model = self.model()?;
        let probabilities = self.poison_on_fatal(model.probabilities(tensor))?;

        classify(&probabilities, catalog, k)
    }
}

fn model_load_error(message: String) -> MlError {
    error!("model load failed: {}", message);
    MlError::ModelLoadError(message)
}
