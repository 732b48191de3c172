pub mod classifier;
pub mod preprocess;
pub mod service;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unexpected tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Failed to load model {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("Model error: {0}")]
    Model(String),
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

impl InferenceError {
    /// Whether the failure was caused by the uploaded bytes rather than the
    /// service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, InferenceError::Decode(_))
    }
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Model(err.to_string())
    }
}
