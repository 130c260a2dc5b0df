use std::path::PathBuf;
use thiserror::Error;

/// Structured error types shared by the four segmentation tools.
///
/// # Why structured errors
///
/// Each variant captures context specific to its error domain (filesystem,
/// image decoding, model execution, artifact conversion), so callers can react
/// to the category without parsing strings. The thiserror crate generates the
/// Display implementations from the format strings.
#[derive(Error, Debug)]
pub enum SegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A user-supplied path does not exist. Always fatal: the tools never
    /// retry or guess an alternative location.
    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Artifact conversion failure that survived the widened-registry retry.
    #[error("Conversion error: {operation} failed")]
    Conversion {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SegError>;

/// Convert anyhow errors to model errors.
///
/// # Why this conversion exists
///
/// tract's `TractError` is an alias for `anyhow::Error`, so every `?` on a
/// tract call inside the library lands here. Model execution is by far the
/// dominant tract surface, hence the Model category; code with more precise
/// context (the converter) constructs its variant explicitly.
impl From<anyhow::Error> for SegError {
    fn from(err: anyhow::Error) -> Self {
        SegError::Model {
            operation: "tract operation".to_string(),
            source: err.into(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Some I/O errors occur without specific path/operation context; this
/// conversion provides a fallback. Code that has context should construct
/// `SegError::FileSystem` directly with the specific path and operation.
impl From<std::io::Error> for SegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for SegError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for SegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to model errors.
///
/// Shape errors occur while rebuilding tensors around inference calls, which
/// is part of model execution, so they share the Model category rather than
/// getting a separate tensor error type.
impl From<ndarray::ShapeError> for SegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
