//! Model Loading with Fallback
//!
//! Loads the image model, random forest and scaler artifacts at startup.
//! An artifact that is missing or unusable is replaced by a shape-compatible
//! placeholder so the service always starts; the outcome records which
//! models are placeholders and why.

mod loader;
mod outcome;
mod placeholder;

pub use loader::{load_image_model, load_models, load_tabular_model, LoadedModels, ModelPaths, ModelStatus};
pub use outcome::{ArtifactStatus, LoadOutcome};
pub use placeholder::{placeholder_image_model, placeholder_tabular_model, SYNTHETIC_SAMPLES};

use inference_engine::InferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons an artifact could not be used
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{} not found", .path.display())]
    Missing { path: PathBuf },

    #[error(transparent)]
    Model(#[from] InferenceError),
}
