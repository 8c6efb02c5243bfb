//! ONNX graphs executed with tract
//!
//! The trained leaf classifier, random forest and feature scaler are all
//! exported to ONNX and loaded here. Each graph is run once on a zero input
//! at load time so a mismatched export fails before it is served.

use crate::engine::{FeatureScaler, ImageClassifier, TabularClassifier};
use crate::labels::NUM_LEAF_CLASSES;
use crate::InferenceError;
use preprocessing::{ImageTensor, FEATURE_COUNT};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

const ROW_SHAPE: [usize; 2] = [1, FEATURE_COUNT];

/// Optimized graph with a single fixed-shape f32 input
struct OnnxPlan {
    plan: Plan,
    path: PathBuf,
    input_shape: Vec<usize>,
}

impl OnnxPlan {
    fn load(path: &Path, input_shape: &[usize]) -> Result<Self, InferenceError> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape.iter().copied()).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelLoadError(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            plan,
            path: path.to_path_buf(),
            input_shape: input_shape.to_vec(),
        })
    }

    /// Run the graph and return the first f32 output holding `len` values.
    ///
    /// Classifier exports also emit an integer label tensor, which is skipped.
    fn run(&self, input: &[f32], len: usize) -> Result<Vec<f32>, InferenceError> {
        let tensor = Tensor::from_shape(&self.input_shape, input)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        for output in outputs.iter() {
            if output.datum_type() != f32::datum_type() || output.len() != len {
                continue;
            }
            debug!("ONNX output shape {:?} from {}", output.shape(), self.path.display());
            let values = output
                .as_slice::<f32>()
                .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
            return Ok(values.to_vec());
        }

        let shapes: Vec<String> = outputs
            .iter()
            .map(|o| format!("{:?}{:?}", o.datum_type(), o.shape()))
            .collect();
        Err(InferenceError::InferenceFailed(format!(
            "expected an f32 output with {} values, got [{}]",
            len,
            shapes.join(", ")
        )))
    }

    fn load_error(&self, e: InferenceError) -> InferenceError {
        InferenceError::ModelLoadError(format!("{}: {}", self.path.display(), e))
    }
}

fn row_to_f32(row: &[f64; FEATURE_COUNT]) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

/// Trained leaf classifier exported to ONNX.
///
/// The graph must take `f32[1, 128, 128, 3]` (NHWC, values in [0, 1]) and
/// produce four class probabilities.
pub struct OnnxCnn {
    plan: OnnxPlan,
}

impl std::fmt::Debug for OnnxCnn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxCnn").field("path", &self.plan.path).finish()
    }
}

impl OnnxCnn {
    /// Load, optimize, and shape-check the graph at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX image model from {}", path.display());

        let cnn = Self {
            plan: OnnxPlan::load(path, &ImageTensor::shape())?,
        };
        cnn.predict_proba(&ImageTensor::zeros())
            .map_err(|e| cnn.plan.load_error(e))?;

        Ok(cnn)
    }
}

impl ImageClassifier for OnnxCnn {
    fn name(&self) -> &'static str {
        "onnx-cnn"
    }

    fn predict_proba(&self, input: &ImageTensor) -> Result<[f32; NUM_LEAF_CLASSES], InferenceError> {
        let values = self.plan.run(&input.to_vec(), NUM_LEAF_CLASSES)?;
        values.try_into().map_err(|v: Vec<f32>| {
            InferenceError::InferenceFailed(format!(
                "expected {} class probabilities, got {}",
                NUM_LEAF_CLASSES,
                v.len()
            ))
        })
    }
}

/// Random forest exported to ONNX as a `TreeEnsembleClassifier`.
///
/// Takes `f32[1, 6]` scaled features. The export must emit probabilities as a
/// plain `f32[1, 2]` tensor (no ZipMap).
pub struct OnnxForest {
    plan: OnnxPlan,
}

impl std::fmt::Debug for OnnxForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxForest").field("path", &self.plan.path).finish()
    }
}

impl OnnxForest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX random forest from {}", path.display());

        let forest = Self {
            plan: OnnxPlan::load(path, &ROW_SHAPE)?,
        };
        forest
            .predict_proba(&[0.0; FEATURE_COUNT])
            .map_err(|e| forest.plan.load_error(e))?;

        Ok(forest)
    }
}

impl TabularClassifier for OnnxForest {
    fn name(&self) -> &'static str {
        "onnx-random-forest"
    }

    fn predict_proba(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; 2], InferenceError> {
        let values = self.plan.run(&row_to_f32(row), 2)?;
        Ok([values[0] as f64, values[1] as f64])
    }
}

/// Feature scaler exported to ONNX, `f32[1, 6]` in and out
pub struct OnnxScaler {
    plan: OnnxPlan,
}

impl std::fmt::Debug for OnnxScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxScaler").field("path", &self.plan.path).finish()
    }
}

impl OnnxScaler {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX feature scaler from {}", path.display());

        let scaler = Self {
            plan: OnnxPlan::load(path, &ROW_SHAPE)?,
        };
        scaler
            .transform(&[0.0; FEATURE_COUNT])
            .map_err(|e| scaler.plan.load_error(e))?;

        Ok(scaler)
    }
}

impl FeatureScaler for OnnxScaler {
    fn name(&self) -> &'static str {
        "onnx-scaler"
    }

    fn transform(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; FEATURE_COUNT], InferenceError> {
        let values = self.plan.run(&row_to_f32(row), FEATURE_COUNT)?;
        let mut scaled = [0.0; FEATURE_COUNT];
        for (dst, src) in scaled.iter_mut().zip(values) {
            *dst = src as f64;
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::labels::LeafCondition;

    fn write(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn solid(rgb: [u8; 3]) -> ImageTensor {
        let image = image::RgbImage::from_pixel(128, 128, image::Rgb(rgb));
        preprocessing::tensor_from_rgb(&image).unwrap()
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = OnnxCnn::load("/nonexistent/cnn_model.onnx").unwrap_err();
        assert!(matches!(err, InferenceError::ModelLoadError(_)));
    }

    #[test]
    fn test_garbage_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "garbage.onnx", b"not a protobuf graph".to_vec());

        for err in [
            OnnxCnn::load(&path).unwrap_err(),
            OnnxForest::load(&path).unwrap_err(),
            OnnxScaler::load(&path).unwrap_err(),
        ] {
            assert!(matches!(err, InferenceError::ModelLoadError(_)));
        }
    }

    #[test]
    fn test_cnn_graph_classifies_by_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cnn_model.onnx", fixtures::leaf_cnn());
        let cnn = OnnxCnn::load(&path).unwrap();

        let proba = cnn.predict_proba(&solid([0, 255, 0])).unwrap();
        assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        // logits [0.1, 0, 4, 0]
        let norm = 0.1f32.exp() + 2.0 + 4.0f32.exp();
        assert!((proba[LeafCondition::Healthy as usize] - 4.0f32.exp() / norm).abs() < 1e-4);
        assert!(proba[LeafCondition::Healthy as usize] > 0.9);

        let proba = cnn.predict_proba(&solid([255, 0, 0])).unwrap();
        assert!(proba[LeafCondition::BrownSpots as usize] > 0.9);

        // Zero image leans on the bias only
        let proba = cnn.predict_proba(&ImageTensor::zeros()).unwrap();
        assert!(proba[LeafCondition::BacterialLeafBlight as usize] > proba[1]);
    }

    #[test]
    fn test_tabular_graphs_load_and_run() {
        let dir = tempfile::tempdir().unwrap();
        let forest = OnnxForest::load(write(dir.path(), "rf_model.onnx", fixtures::field_forest())).unwrap();
        let scaler = OnnxScaler::load(write(dir.path(), "scaler.onnx", fixtures::field_scaler())).unwrap();

        let scaled = scaler.transform(&[35.0, 22.0, 27.0, 5.0, 6.5, 85.0]).unwrap();
        let expected = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        for (got, want) in scaled.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{:?}", scaled);
        }

        // Both trees vote class 1 when feature 2 <= 0 and feature 5 <= 1
        let proba = forest.predict_proba(&scaled).unwrap();
        assert!((proba[0] - 0.1).abs() < 1e-5);
        assert!((proba[1] - 0.9).abs() < 1e-5);

        let proba = forest.predict_proba(&[0.0, 0.0, 1.0, 0.0, 0.0, 2.0]).unwrap();
        assert!((proba[0] - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_wrong_graph_for_slot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scaler_graph = write(dir.path(), "scaler.onnx", fixtures::field_scaler());
        let cnn_graph = write(dir.path(), "cnn_model.onnx", fixtures::leaf_cnn());

        // Scaler emits six values, not two probabilities
        assert!(matches!(
            OnnxForest::load(&scaler_graph).unwrap_err(),
            InferenceError::ModelLoadError(_)
        ));
        assert!(OnnxCnn::load(&scaler_graph).is_err());
        assert!(OnnxScaler::load(&cnn_graph).is_err());
    }
}
