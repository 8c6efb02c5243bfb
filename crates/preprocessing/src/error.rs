//! Preprocessing Error Types

use thiserror::Error;

/// Errors while turning request payloads into model inputs
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// Bytes could not be decoded as an image
    #[error("cannot identify image file: {0}")]
    ImageDecode(String),

    /// Decoded image has no pixels
    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Feature row width does not match what the scaler was fitted on
    #[error("X has {actual} features, but the scaler is expecting {expected} features as input")]
    FeatureCount { expected: usize, actual: usize },

    /// Scaler used before `fit`
    #[error("this StandardScaler instance is not fitted yet; call fit before transform")]
    NotFitted,

    /// Fit called without samples
    #[error("cannot fit a scaler on zero samples")]
    EmptyInput,

    /// Persisted scaler parameters are unusable
    #[error("invalid scaler parameters: {0}")]
    InvalidParameters(String),
}
