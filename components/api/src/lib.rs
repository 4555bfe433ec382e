//! Entry point of the leaf diagnosis pipeline.
//!
//! [`Api`] strings the stages together (preprocess, predict, catalog lookup)
//! and turns every stage failure into one user-visible [`Error`].

use std::str::FromStr;

use inference::{InferenceProvider, ModelMetadata, ProviderConfig};
use leafpostprocessor::{Catalog, DiseaseInfo};
use leafpreprocessor::{decode_image, tensor_from_image, ColorPolicy, PixelScale, PreprocessConfig};
use mltypes::{Classifications, Tensor};
use serde::Serialize;
use tracing::{debug, info};

mod errors;
pub mod report;

pub use errors::{Error, ErrorKind, Result};

/// Outcome of one diagnosis, ready to be displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub class_index: usize,
    pub label: String,
    pub healthy: bool,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DiseaseInfo>,
    /// General care tips, only given for healthy leaves.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<String>,
}

/// Summary of the loaded model, see [`Api::prefetch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model_name: Option<String>,
    pub graph_encoding: String,
    pub input_shape: Vec<usize>,
    pub pixel_scale: String,
    pub output_activation: String,
}

pub struct Api {
    provider: InferenceProvider,
    catalog: Catalog,
    color_policy: ColorPolicy,
}

impl Api {
    pub fn new(provider: InferenceProvider, catalog: Catalog) -> Self {
        Api {
            provider,
            catalog,
            color_policy: ColorPolicy::default(),
        }
    }

    /// Provider and catalog as configured; the builtin catalog unless a
    /// catalog path is set.
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        let catalog = match config.catalog_path() {
            Some(path) => {
                info!("using disease catalog '{}'", path.display());
                Catalog::from_path(path)?
            }
            None => Catalog::builtin()?,
        };

        Ok(Api::new(InferenceProvider::new(config), catalog))
    }

    pub fn with_color_policy(mut self, color_policy: ColorPolicy) -> Self {
        self.color_policy = color_policy;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Loads and warms up the model ahead of the first request.
    pub fn prefetch(&self) -> Result<ModelSummary> {
        let model = self.provider.model()?;
        let metadata = model.metadata();

        Ok(ModelSummary {
            model_name: metadata.model_name.clone(),
            graph_encoding: metadata.graph_encoding.clone(),
            input_shape: model.input_shape().to_vec(),
            pixel_scale: format!("{:?}", pixel_scale(metadata)).to_lowercase(),
            output_activation: or_default(&metadata.output_activation, "softmax"),
        })
    }

    /// Preprocessing parameters matching the loaded model's input.
    pub fn preprocess_config(&self) -> Result<PreprocessConfig> {
        let model = self.provider.model()?;

        let config = PreprocessConfig::for_input_shape(model.input_shape())?
            .with_pixel_scale(pixel_scale(model.metadata()))
            .with_color_policy(self.color_policy);

        Ok(config)
    }

    /// The tensor `bytes` are turned into before inference.
    ///
    /// The upload is decoded before the model is loaded, so an unreadable
    /// image is reported as such even when the model is unavailable.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Tensor> {
        let image = decode_image(bytes, self.color_policy)?;
        let config = self.preprocess_config()?;
        Ok(tensor_from_image(image, &config))
    }

    /// Reads a headerless little-endian `f32` tensor of the model input shape.
    pub fn tensor_from_le_bytes(&self, bytes: &[u8]) -> Result<Tensor> {
        let model = self.provider.model()?;
        Ok(Tensor::from_le_bytes(model.input_shape().to_vec(), bytes)?)
    }

    /// Inference and catalog lookup on an already preprocessed tensor.
    pub fn infer_tensor(&self, tensor: &Tensor) -> Result<Diagnosis> {
        let prediction = self.provider.predict(tensor)?;

        let class = self
            .catalog
            .by_index(prediction.class_index)
            .ok_or_else(|| Error::unknown_class(prediction.class_index))?;

        debug!(
            "diagnosis: '{}' with confidence {}",
            class.label, prediction.confidence
        );

        let advice = if class.healthy {
            self.catalog.healthy_advice().to_vec()
        } else {
            Vec::new()
        };

        Ok(Diagnosis {
            class_index: prediction.class_index,
            label: class.label.clone(),
            healthy: class.healthy,
            confidence: prediction.confidence,
            info: class.info.clone(),
            advice,
        })
    }

    /// Full pipeline from uploaded bytes to a displayable diagnosis.
    pub fn diagnose(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let tensor = self.preprocess(bytes)?;
        self.infer_tensor(&tensor)
    }

    /// The `k` most likely classes of an upload.
    pub fn top_k(&self, bytes: &[u8], k: usize) -> Result<Classifications> {
        let tensor = self.preprocess(bytes)?;
        Ok(self.provider.classify(&tensor, &self.catalog, k)?)
    }
}

fn pixel_scale(metadata: &ModelMetadata) -> PixelScale {
    if metadata.pixel_scale.trim().is_empty() {
        return PixelScale::default();
    }
    // unknown values fall back to raw with a warning
    PixelScale::from_str(&metadata.pixel_scale).unwrap_or_default()
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_lowercase()
    }
}
