//! Startup artifact loading

use crate::outcome::{ArtifactStatus, LoadOutcome};
use crate::placeholder::{placeholder_image_model, placeholder_tabular_model};
use crate::LoadError;
use inference_engine::{
    ImageClassifier, InferenceEngine, InferenceError, OnnxCnn, OnnxForest, OnnxScaler, TabularModel,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Artifact locations
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub cnn: PathBuf,
    pub rf: PathBuf,
    pub scaler: PathBuf,
}

impl ModelPaths {
    /// Artifacts living side by side in one directory
    pub fn in_dir(dir: impl AsRef<Path>, cnn_file: &str, rf_file: &str, scaler_file: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            cnn: dir.join(cnn_file),
            rf: dir.join(rf_file),
            scaler: dir.join(scaler_file),
        }
    }
}

/// Which slots hold trained models and which hold placeholders
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub cnn_model: ArtifactStatus,
    pub rf_model: ArtifactStatus,
    pub scaler: ArtifactStatus,
}

impl ModelStatus {
    pub fn any_fallback(&self) -> bool {
        self.cnn_model.fallback || self.rf_model.fallback || self.scaler.fallback
    }
}

/// Everything the service needs after startup
pub struct LoadedModels {
    pub engine: InferenceEngine,
    pub status: ModelStatus,
}

/// Load the ONNX image model, falling back to an untrained CNN
pub fn load_image_model(path: &Path, seed: u64) -> LoadOutcome<Box<dyn ImageClassifier>> {
    match OnnxCnn::load(path) {
        Ok(model) => {
            info!("CNN model loaded successfully from {}", path.display());
            LoadOutcome::Loaded(Box::new(model))
        }
        Err(e) => {
            warn!("Error loading CNN model: {}", e);
            warn!("Using fallback CNN model (seed {})", seed);
            LoadOutcome::Fallback {
                model: placeholder_image_model(seed),
                reason: e.to_string(),
            }
        }
    }
}

/// Load the forest and scaler as a pair. If either is unusable both are
/// replaced, since a trained forest is meaningless behind a different scaler.
pub fn load_tabular_model(
    rf_path: &Path,
    scaler_path: &Path,
    seed: u64,
) -> Result<LoadOutcome<TabularModel>, InferenceError> {
    match read_tabular(rf_path, scaler_path) {
        Ok(model) => {
            info!(
                "Random Forest model and scaler loaded successfully from {} and {}",
                rf_path.display(),
                scaler_path.display()
            );
            Ok(LoadOutcome::Loaded(model))
        }
        Err(e) => {
            warn!("Random Forest model or scaler unusable: {}", e);
            warn!("Using fallback model fitted on synthetic data; environmental predictions will be placeholder");
            Ok(LoadOutcome::Fallback {
                model: placeholder_tabular_model(seed)?,
                reason: e.to_string(),
            })
        }
    }
}

fn read_tabular(rf_path: &Path, scaler_path: &Path) -> Result<TabularModel, LoadError> {
    for path in [rf_path, scaler_path] {
        if !path.is_file() {
            return Err(LoadError::Missing {
                path: path.to_path_buf(),
            });
        }
    }

    let scaler = OnnxScaler::load(scaler_path)?;
    let forest = OnnxForest::load(rf_path)?;
    Ok(TabularModel::new(Box::new(scaler), Box::new(forest)))
}

/// Load all three artifacts. Only a failure to build a placeholder is an error.
pub fn load_models(paths: &ModelPaths, seed: u64) -> Result<LoadedModels, InferenceError> {
    let image = load_image_model(&paths.cnn, seed);
    let tabular = load_tabular_model(&paths.rf, &paths.scaler, seed)?;

    let status = ModelStatus {
        cnn_model: image.status(),
        rf_model: tabular.status(),
        scaler: tabular.status(),
    };

    if status.any_fallback() {
        warn!("Serving with placeholder models; retrain or re-export the artifacts for accurate predictions");
    } else {
        info!("All models loaded successfully");
    }

    Ok(LoadedModels {
        engine: InferenceEngine::new(image.into_model(), tabular.into_model()),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use inference_engine::{fixtures, FieldCondition, LeafCondition};
    use preprocessing::EnvironmentalReading;
    use std::io::Cursor;

    fn paths(dir: &Path) -> ModelPaths {
        ModelPaths::in_dir(dir, "cnn_model.onnx", "rf_model.onnx", "scaler.onnx")
    }

    fn png(rgb: [u8; 3]) -> Vec<u8> {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb(rgb)))
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        png.into_inner()
    }

    fn reading(temperature: f64, relative_humidity: f64) -> EnvironmentalReading {
        EnvironmentalReading {
            maximum_temperature: 34.0,
            minimum_temperature: 23.0,
            temperature,
            precipitation: 5.0,
            soil_ph: 6.4,
            relative_humidity,
        }
    }

    #[test]
    fn test_missing_directory_falls_back_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_models(&paths(&dir.path().join("absent")), 42).unwrap();

        assert!(loaded.status.cnn_model.fallback);
        assert!(loaded.status.rf_model.fallback);
        assert!(loaded.status.scaler.fallback);
        assert!(loaded.status.cnn_model.loaded && loaded.status.rf_model.loaded && loaded.status.scaler.loaded);

        let prediction = loaded.engine.predict_image(&png([90, 140, 60])).unwrap();
        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);

        let condition = loaded.engine.predict_environment(&reading(28.0, 80.0)).unwrap().condition;
        assert!(matches!(condition, FieldCondition::Bad | FieldCondition::Good));
    }

    #[test]
    fn test_trained_artifacts_served() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();

        let loaded = load_models(&paths(dir.path()), 42).unwrap();
        assert!(!loaded.status.any_fallback());
        assert_eq!(loaded.status.rf_model.reason, None);
        assert_eq!(loaded.engine.image_model_name(), "onnx-cnn");

        let prediction = loaded.engine.predict_image(&png([0, 255, 0])).unwrap();
        assert_eq!(prediction.label, LeafCondition::Healthy);

        let good = loaded.engine.predict_environment(&reading(25.0, 80.0)).unwrap();
        assert_eq!(good.condition, FieldCondition::Good);
        assert!((good.confidence - 0.9).abs() < 1e-5);

        let bad = loaded.engine.predict_environment(&reading(28.4, 82.0)).unwrap();
        assert_eq!(bad.condition, FieldCondition::Bad);
        assert!((bad.confidence - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_image_model_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();

        let outcome = load_image_model(&paths(dir.path()).cnn, 5);
        assert!(matches!(outcome, LoadOutcome::Loaded(_)));
        assert_eq!(outcome.status().reason, None);
        assert_eq!(outcome.model().name(), "onnx-cnn");
    }

    #[test]
    fn test_tabular_artifacts_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();
        let p = paths(dir.path());

        let outcome = load_tabular_model(&p.rf, &p.scaler, 1).unwrap();
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.model().classifier_name(), "onnx-random-forest");
        assert_eq!(outcome.model().scaler_name(), "onnx-scaler");
    }

    #[test]
    fn test_corrupt_forest_replaces_pair() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();
        std::fs::write(dir.path().join("rf_model.onnx"), b"\x00\x01\x02").unwrap();
        let p = paths(dir.path());

        let outcome = load_tabular_model(&p.rf, &p.scaler, 1).unwrap();
        assert!(outcome.is_fallback());
        assert!(outcome.reason().unwrap().contains("rf_model.onnx"));
        // The trained scaler is not kept behind a placeholder forest
        assert_eq!(outcome.model().scaler_name(), "standard-scaler");
    }

    #[test]
    fn test_scaler_graph_in_forest_slot_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();
        std::fs::write(dir.path().join("rf_model.onnx"), fixtures::field_scaler()).unwrap();
        let p = paths(dir.path());

        assert!(load_tabular_model(&p.rf, &p.scaler, 1).unwrap().is_fallback());
    }

    #[test]
    fn test_missing_scaler_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_models(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("scaler.onnx")).unwrap();
        let p = paths(dir.path());

        let outcome = load_tabular_model(&p.rf, &p.scaler, 1).unwrap();
        assert!(outcome.is_fallback());
        assert!(outcome.reason().unwrap().contains("scaler.onnx"));
    }

    #[test]
    fn test_invalid_onnx_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cnn_model.onnx"), b"\x00\x01\x02").unwrap();

        let outcome = load_image_model(&dir.path().join("cnn_model.onnx"), 5);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.model().name(), "sequential-cnn");
    }
}
