//! Library error type.

/// Errors produced while reading frames, running networks or rendering output.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Filesystem or stream I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Image decode/encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// Malformed JSON configuration or stream description.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Tensor had an unexpected dimensionality.
    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// ONNX Runtime failed to load or run a model.
    #[error("inference error: {0}")]
    Inference(String),
    /// A model returned tensors that cannot be interpreted.
    #[error("unexpected model output: {0}")]
    ModelOutput(String),
    /// Configuration values are inconsistent or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Camera stream could not be opened or delivered a bad frame.
    #[error("camera error: {0}")]
    Camera(String),
    /// OpenCV backend failure.
    #[cfg(feature = "opencv")]
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl PipelineError {
    pub(crate) fn inference(err: impl std::fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
