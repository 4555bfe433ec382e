use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod model_loader;

pub use crate::data_loader::model_loader::{
    untar_model_and_metadata, ModelMetadata, DEFAULT_TENSOR_SHAPE_IN,
};

/// A model artifact together with its metadata.
pub struct ModelRawData {
    pub model: Vec<u8>,
    pub metadata: ModelMetadata,
}

/// Loads a model from `path`.
///
/// `path` is either a plain model file, optionally accompanied by a metadata
/// file with the same stem and a `.json` extension, or a `.tar`/`.tar.gz`/`.tgz`
/// bundle holding both.
pub fn load_model(path: &Path) -> DataLoaderResult<ModelRawData> {
    info!("loading model artifact '{}'", path.display());

    if !path.is_file() {
        return Err(DataLoaderError::ModelNotFound(path.to_path_buf()));
    }

    let model_data = match bundle_kind(path) {
        Some(compressed) => load_bundle(path, compressed)?,
        None => load_model_file(path)?,
    };

    info!(
        "LOADED - metadata '{:?}' and model of size '{}'",
        &model_data.metadata,
        model_data.model.len()
    );

    Ok(model_data)
}

/// `Some(true)` for compressed bundles, `Some(false)` for plain tar archives.
fn bundle_kind(path: &Path) -> Option<bool> {
    let name = path.file_name()?.to_str()?.to_lowercase();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(true)
    } else if name.ends_with(".tar") {
        Some(false)
    } else {
        None
    }
}

fn load_bundle(path: &Path, compressed: bool) -> DataLoaderResult<ModelRawData> {
    let layer = read_file(path)?;

    let archive = if compressed {
        uncompress_layer(layer)?
    } else {
        layer
    };

    debug!("Uncompressed bundle size: {} [bytes]", archive.len());

    let (model, meta_rawdata) = untar_model_and_metadata(archive)?;
    let metadata = ModelMetadata::from_rawdata(&meta_rawdata)?;

    Ok(ModelRawData { model, metadata })
}

fn load_model_file(path: &Path) -> DataLoaderResult<ModelRawData> {
    let model = read_file(path)?;

    let sidecar = metadata_path(path);
    let metadata = if sidecar.is_file() {
        debug!("reading model metadata from '{}'", sidecar.display());
        ModelMetadata::from_rawdata(&read_file(&sidecar)?)?
    } else {
        debug!("no metadata next to '{}', using defaults", path.display());
        ModelMetadata::for_model_file(path)?
    };

    Ok(ModelRawData { model, metadata })
}

/// `models/leaf.onnx` -> `models/leaf.json`
pub fn metadata_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("json")
}

fn read_file(path: &Path) -> DataLoaderResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        DataLoaderError::ModelLoaderReadError(format!("'{}': {}", path.display(), e))
    })
}

fn uncompress_layer(layer: Vec<u8>) -> DataLoaderResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(layer.as_slice());
    let mut archive = Vec::new();

    decoder
        .read_to_end(&mut archive)
        .map_err(|e| DataLoaderError::UncompressError(e.to_string()))?;

    Ok(archive)
}

/// Data Loader Result
pub type DataLoaderResult<T> = Result<T, DataLoaderError>;

#[derive(Debug, thiserror::Error)]
pub enum DataLoaderError {
    #[error("model artifact '{0}' does not exist")]
    ModelNotFound(PathBuf),

    #[error("invalid input {0}")]
    ModelLoaderReadError(String),

    #[error("invalid tar archive {0}")]
    ModelLoaderTarError(String),

    #[error("invalid json {0}")]
    ModelLoaderJsonError(String),

    #[error("Error parsing metadata {0}")]
    ModelLoaderMetadataError(String),

    #[error("Unable to uncompress bundle: {0}")]
    UncompressError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_kind_follows_the_file_name() {
        assert_eq!(bundle_kind(Path::new("m/leaf.tar.gz")), Some(true));
        assert_eq!(bundle_kind(Path::new("leaf.TGZ")), Some(true));
        assert_eq!(bundle_kind(Path::new("leaf.tar")), Some(false));
        assert_eq!(bundle_kind(Path::new("leaf.onnx")), None);
    }

    #[test]
    fn sidecar_metadata_shares_the_stem() {
        assert_eq!(
            metadata_path(Path::new("models/trained_model.onnx")),
            PathBuf::from("models/trained_model.json")
        );
    }
}
