pub type MlResult<T> = Result<T, MlError>;

/// Failure taxonomy of the image-to-label pipeline.
///
/// Each stage owns its own detailed error type; they are flattened into this
/// enum where a stage hands its result to the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MlError {
    #[error("invalid image data: {0}")]
    DecodeError(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormatError(String),

    /// The model artifact is missing, corrupt or does not match the label set.
    /// No inference is possible for the rest of the process lifetime.
    #[error("model could not be loaded: {0}")]
    ModelLoadError(String),

    #[error("inference failed: {0}")]
    InferenceError(String),
}

impl MlError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MlError::ModelLoadError(_))
    }
}
