//! Inference Engine
//!
//! Runs the two models behind the service:
//! - Leaf image classification, either an ONNX graph executed with tract or
//!   the native sequential CNN used as a placeholder
//! - Field condition classification with a random forest over scaled
//!   environmental readings, either exported to ONNX or fitted natively as a
//!   placeholder

mod cnn;
mod engine;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod forest;
mod labels;
mod onnx;

pub use cnn::SequentialCnn;
pub use engine::{
    EnvironmentPrediction, FeatureScaler, ImageClassifier, ImagePrediction, InferenceEngine,
    TabularClassifier, TabularModel,
};
pub use forest::{DecisionTree, ForestConfig, Node, RandomForest};
pub use labels::{FieldCondition, LeafCondition, NUM_LEAF_CLASSES};
pub use onnx::{OnnxCnn, OnnxForest, OnnxScaler};

use preprocessing::PreprocessError;
use thiserror::Error;

/// Errors during model loading or inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

impl InferenceError {
    /// Whether the failure was caused by the caller's input rather than the model
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            InferenceError::Preprocess(
                PreprocessError::ImageDecode(_) | PreprocessError::EmptyImage { .. }
            )
        )
    }
}
