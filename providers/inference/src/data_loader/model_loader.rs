use super::*;

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tar::Archive;

use crate::engine::GraphEncoding;

/// Input shape of the leaf classifier, NHWC.
pub const DEFAULT_TENSOR_SHAPE_IN: [u32; 4] = [1, 128, 128, 3];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Model name
    /// Optional, the artifact's file name is used instead.
    #[serde(default)]
    pub model_name: Option<String>,

    /// graph encoding
    /// Mandatory
    pub graph_encoding: String,

    /// execution target
    /// Shall default to 'Cpu' in case, it is erroneous or not provided
    #[serde(default)]
    pub execution_target: String,

    /// tensor dimensions in (optional)
    /// Defaults to [`DEFAULT_TENSOR_SHAPE_IN`].
    #[serde(default)]
    pub tensor_shape_in: Option<Vec<u32>>,

    /// tensor dimensions out (optional)
    #[serde(default)]
    pub tensor_shape_out: Option<Vec<u32>>,

    /// 'raw' (0..=255) or 'unit' (0..=1)
    /// Shall default to 'raw' in case, it is erroneous or not provided
    #[serde(default)]
    pub pixel_scale: String,

    /// 'softmax' when the graph ends with a softmax, 'logits' otherwise
    /// Shall default to 'softmax' in case, it is erroneous or not provided
    #[serde(default)]
    pub output_activation: String,
}

impl ModelMetadata {
    /// load metadata from json
    pub fn from_rawdata(data: &[u8]) -> Result<Self, DataLoaderError> {
        serde_json::from_slice(data).map_err(|e| {
            DataLoaderError::ModelLoaderJsonError(format!("invalid json (metadata): {}", e))
        })
    }

    /// Metadata for a bare model file, the encoding is taken from its extension.
    pub fn for_model_file(path: &Path) -> Result<Self, DataLoaderError> {
        let encoding = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("onnx") => GraphEncoding::Onnx,
            Some("pb") => GraphEncoding::Tensorflow,
            Some("tflite") => GraphEncoding::TfLite,
            other => {
                return Err(DataLoaderError::ModelLoaderMetadataError(format!(
                    "cannot derive graph encoding from extension {:?} of '{}'",
                    other,
                    path.display()
                )))
            }
        };

        Ok(ModelMetadata {
            model_name: path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string),
            graph_encoding: encoding.to_string(),
            execution_target: String::new(),
            tensor_shape_in: None,
            tensor_shape_out: None,
            pixel_scale: String::new(),
            output_activation: String::new(),
        })
    }

    pub fn input_shape(&self) -> Vec<usize> {
        self.tensor_shape_in
            .as_deref()
            .unwrap_or(&DEFAULT_TENSOR_SHAPE_IN)
            .iter()
            .map(|d| *d as usize)
            .collect()
    }

    /// Number of values the model emits, when declared.
    pub fn output_len(&self) -> Option<usize> {
        self.tensor_shape_out
            .as_ref()
            .map(|shape| shape.iter().map(|d| *d as usize).product())
    }
}

/// get model and metadata
///
/// The first `.json` entry is the metadata, the first other file the model.
pub fn untar_model_and_metadata(data: Vec<u8>) -> DataLoaderResult<(Vec<u8>, Vec<u8>)> {
    let mut tar_archive = Archive::new(Cursor::new(data));

    let tar_entries = tar_archive.entries().map_err(|error| {
        log::error!("The tar archive does not contain any entries!");
        DataLoaderError::ModelLoaderTarError(format!("{}", error))
    })?;

    let mut metadata: Option<Vec<u8>> = None;
    let mut model: Option<Vec<u8>> = None;

    for entry in tar_entries {
        let mut entry = entry.map_err(|e| DataLoaderError::ModelLoaderTarError(format!("{}", e)))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let is_json = entry
            .path()
            .map_err(|e| DataLoaderError::ModelLoaderTarError(format!("{}", e)))?
            .extension()
            .is_some_and(|ext| ext.to_str().is_some_and(|e| e == "json"));

        let slot = if is_json { &mut metadata } else { &mut model };
        if slot.is_some() {
            continue;
        }

        let mut content: Vec<u8> = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| DataLoaderError::ModelLoaderReadError(format!("{}", e)))?;
        *slot = Some(content);

        if metadata.is_some() && model.is_some() {
            break;
        }
    }

    let metadata = metadata.ok_or_else(|| {
        DataLoaderError::ModelLoaderTarError("No JSON file found in the tar archive".to_string())
    })?;
    let model = model.ok_or_else(|| {
        DataLoaderError::ModelLoaderTarError("No model found in the tar archive".to_string())
    })?;

    Ok((model, metadata))
}
