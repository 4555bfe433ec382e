use leafpostprocessor::CatalogError;
use mltypes::MlError;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The upload is not a readable image.
    BadInput,
    /// The upload is an image, just not one we accept.
    UnsupportedInput,
    /// The model artifact cannot be used; nothing will work until it is fixed.
    ModelUnavailable,
    /// The disease catalog is missing or malformed.
    Configuration,
    /// Inference itself failed.
    Internal,
}

/// The single user-visible failure of a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::ModelUnavailable | ErrorKind::Configuration)
    }

    /// Process exit status for the command line, sysexits style.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::BadInput | ErrorKind::UnsupportedInput => 65,
            ErrorKind::ModelUnavailable => 69,
            ErrorKind::Internal => 70,
            ErrorKind::Configuration => 78,
        }
    }

    pub fn unknown_class(index: usize) -> Self {
        Error {
            kind: ErrorKind::Configuration,
            message: format!("No catalog entry for the predicted class index {}", index),
        }
    }
}

impl From<MlError> for Error {
    fn from(e: MlError) -> Self {
        error!("Failed to process request: {:?}", e);

        let (kind, message) = match e {
            MlError::DecodeError(detail) => (
                ErrorKind::BadInput,
                format!("The uploaded file is not a readable image: {}", detail),
            ),
            MlError::UnsupportedFormatError(detail) => (
                ErrorKind::UnsupportedInput,
                format!("Please upload a JPEG or PNG photo of a leaf: {}", detail),
            ),
            MlError::ModelLoadError(detail) => (
                ErrorKind::ModelUnavailable,
                format!("The disease model is unavailable: {}", detail),
            ),
            MlError::InferenceError(detail) => (
                ErrorKind::Internal,
                format!("Error during prediction: {}", detail),
            ),
        };

        Error { kind, message }
    }
}

impl From<CatalogError> for Error {
    fn from(e: CatalogError) -> Self {
        error!("Failed to load the disease catalog: {:?}", e);

        Error {
            kind: ErrorKind::Configuration,
            message: format!("The disease catalog is unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_ml_error_gets_its_own_kind() {
        let cases = [
            (MlError::DecodeError("x".into()), ErrorKind::BadInput, 65),
            (MlError::UnsupportedFormatError("x".into()), ErrorKind::UnsupportedInput, 65),
            (MlError::ModelLoadError("x".into()), ErrorKind::ModelUnavailable, 69),
            (MlError::InferenceError("x".into()), ErrorKind::Internal, 70),
        ];

        for (ml_error, kind, code) in cases {
            let error = Error::from(ml_error);
            assert_eq!(error.kind(), kind);
            assert_eq!(error.exit_code(), code);
        }
    }

    #[test]
    fn only_model_and_catalog_failures_are_fatal() {
        assert!(Error::from(MlError::ModelLoadError("gone".into())).is_fatal());
        assert!(Error::from(CatalogError::Invalid("empty".into())).is_fatal());
        assert!(!Error::from(MlError::DecodeError("junk".into())).is_fatal());
    }

    #[test]
    fn message_keeps_the_detail() {
        let error = Error::from(MlError::InferenceError("shape [1, 2]".into()));
        assert_eq!(error.message(), "Error during prediction: shape [1, 2]");
        assert_eq!(error.to_string(), error.message());
    }
}
