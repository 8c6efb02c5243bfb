//! Inference Engine Implementation

use crate::forest::{argmax, RandomForest};
use crate::labels::{FieldCondition, LeafCondition, NUM_LEAF_CLASSES};
use crate::InferenceError;
use preprocessing::{preprocess_image, EnvironmentalReading, ImageTensor, StandardScaler, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Image model seam: anything that maps a normalized image to class probabilities
pub trait ImageClassifier: Send + Sync {
    /// Short identifier for logs and metrics
    fn name(&self) -> &'static str;

    /// Softmax distribution over the leaf classes
    fn predict_proba(&self, input: &ImageTensor) -> Result<[f32; NUM_LEAF_CLASSES], InferenceError>;
}

/// Standardizes a raw environmental row before classification
pub trait FeatureScaler: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; FEATURE_COUNT], InferenceError>;
}

/// Maps a scaled row to `[P(Bad), P(Good)]`
pub trait TabularClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn predict_proba(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; 2], InferenceError>;
}

impl FeatureScaler for StandardScaler {
    fn name(&self) -> &'static str {
        "standard-scaler"
    }

    fn transform(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; FEATURE_COUNT], InferenceError> {
        let scaled = StandardScaler::transform(self, row)?;
        scaled.try_into().map_err(|v: Vec<f64>| InferenceError::InvalidInputShape {
            expected: format!("{} features", FEATURE_COUNT),
            actual: format!("{} features", v.len()),
        })
    }
}

/// Leaf classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePrediction {
    /// Arg-max label
    pub label: LeafCondition,
    /// Probability of the arg-max label
    pub confidence: f32,
    /// Probabilities for each class
    pub probabilities: [f32; NUM_LEAF_CLASSES],
}

impl ImagePrediction {
    /// Pick the arg-max class (first index wins ties)
    pub fn from_probabilities(
        probabilities: [f32; NUM_LEAF_CLASSES],
    ) -> Result<Self, InferenceError> {
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::InferenceFailed(format!(
                "model produced non-finite probabilities {:?}",
                probabilities
            )));
        }

        let (index, confidence) = probabilities.iter().copied().enumerate().fold(
            (0, f32::NEG_INFINITY),
            |(best, best_p), (i, p)| if p > best_p { (i, p) } else { (best, best_p) },
        );
        let label = LeafCondition::from_index(index)
            .ok_or_else(|| InferenceError::InferenceFailed(format!("no label for class {}", index)))?;

        Ok(Self {
            label,
            confidence,
            probabilities,
        })
    }

    pub fn message(&self) -> String {
        self.label.message(self.confidence)
    }
}

/// Field condition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPrediction {
    pub condition: FieldCondition,
    /// Forest vote share for the predicted class
    pub confidence: f64,
}

impl EnvironmentPrediction {
    pub fn message(&self) -> &'static str {
        self.condition.message()
    }
}

/// Classifier paired with the scaler it was trained behind
pub struct TabularModel {
    scaler: Box<dyn FeatureScaler>,
    classifier: Box<dyn TabularClassifier>,
}

impl std::fmt::Debug for TabularModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularModel")
            .field("scaler", &self.scaler.name())
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

impl TabularModel {
    pub fn new(scaler: Box<dyn FeatureScaler>, classifier: Box<dyn TabularClassifier>) -> Self {
        Self { scaler, classifier }
    }

    /// Pair a natively fitted forest and scaler, checking both expect the
    /// reading's features and the forest separates two classes
    pub fn native(forest: RandomForest, scaler: StandardScaler) -> Result<Self, InferenceError> {
        scaler.validate()?;
        if !forest.is_fitted() {
            return Err(InferenceError::InvalidModel("forest is not fitted".into()));
        }

        for (what, width) in [("forest", forest.n_features()), ("scaler", scaler.n_features())] {
            if width != FEATURE_COUNT {
                return Err(InferenceError::InvalidInputShape {
                    expected: format!("{} features", FEATURE_COUNT),
                    actual: format!("{} fitted on {} features", what, width),
                });
            }
        }
        if forest.n_classes() != 2 {
            return Err(InferenceError::InvalidModel(format!(
                "forest has {} classes, expected 2",
                forest.n_classes()
            )));
        }

        Ok(Self::new(Box::new(scaler), Box::new(forest)))
    }

    pub fn scaler_name(&self) -> &'static str {
        self.scaler.name()
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Scale the reading and classify it
    pub fn predict(&self, reading: &EnvironmentalReading) -> Result<EnvironmentPrediction, InferenceError> {
        let scaled = self.scaler.transform(&reading.to_row())?;
        let proba = self.classifier.predict_proba(&scaled)?;
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::InferenceFailed(format!(
                "classifier produced non-finite probabilities {:?}",
                proba
            )));
        }
        let class = argmax(&proba);

        let condition = FieldCondition::from_class(class)
            .ok_or_else(|| InferenceError::InferenceFailed(format!("no label for class {}", class)))?;

        Ok(EnvironmentPrediction {
            condition,
            confidence: proba[class],
        })
    }
}

/// Both models behind the service, immutable once built
pub struct InferenceEngine {
    image_model: Box<dyn ImageClassifier>,
    tabular_model: TabularModel,
}

impl InferenceEngine {
    /// Create a new inference engine
    pub fn new(image_model: Box<dyn ImageClassifier>, tabular_model: TabularModel) -> Self {
        Self {
            image_model,
            tabular_model,
        }
    }

    /// Decode, normalize and classify an uploaded image
    pub fn predict_image(&self, bytes: &[u8]) -> Result<ImagePrediction, InferenceError> {
        let start = std::time::Instant::now();

        let input = preprocess_image(bytes)?;
        let probabilities = self.image_model.predict_proba(&input)?;
        let prediction = ImagePrediction::from_probabilities(probabilities)?;

        debug!(
            "{} predicted {} ({:.3}) in {}ms",
            self.image_model.name(),
            prediction.label.as_str(),
            prediction.confidence,
            start.elapsed().as_millis()
        );
        Ok(prediction)
    }

    /// Classify environmental readings
    pub fn predict_environment(
        &self,
        reading: &EnvironmentalReading,
    ) -> Result<EnvironmentPrediction, InferenceError> {
        let prediction = self.tabular_model.predict(reading)?;
        debug!(
            "{} predicted {} ({:.3})",
            self.tabular_model.classifier_name(),
            prediction.condition.as_str(),
            prediction.confidence
        );
        Ok(prediction)
    }

    /// Identifier of the image model in use
    pub fn image_model_name(&self) -> &'static str {
        self.image_model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestConfig;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Fixed-output classifier for pipeline tests
    struct Constant([f32; NUM_LEAF_CLASSES]);

    impl ImageClassifier for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn predict_proba(&self, _: &ImageTensor) -> Result<[f32; NUM_LEAF_CLASSES], InferenceError> {
            Ok(self.0)
        }
    }

    struct Identity;

    impl FeatureScaler for Identity {
        fn name(&self) -> &'static str {
            "identity"
        }

        fn transform(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; FEATURE_COUNT], InferenceError> {
            Ok(*row)
        }
    }

    /// Votes Good when the scaled temperature is positive
    struct Threshold(f64);

    impl TabularClassifier for Threshold {
        fn name(&self) -> &'static str {
            "threshold"
        }

        fn predict_proba(&self, row: &[f64; FEATURE_COUNT]) -> Result<[f64; 2], InferenceError> {
            Ok(if row[2] > 0.0 { [1.0 - self.0, self.0] } else { [self.0, 1.0 - self.0] })
        }
    }

    fn tabular() -> TabularModel {
        // Good when temperature is moderate, Bad otherwise
        let rows: Vec<[f64; FEATURE_COUNT]> = (0..30)
            .map(|i| {
                let t = 15.0 + i as f64;
                [t + 5.0, t - 5.0, t, 2.0, 6.5, 70.0]
            })
            .collect();
        let labels: Vec<usize> = rows.iter().map(|r| usize::from(r[2] < 30.0)).collect();

        let mut scaler = StandardScaler::new();
        scaler.fit(&rows).unwrap();
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r).unwrap()).collect();

        let mut forest = RandomForest::new(ForestConfig {
            n_estimators: 10,
            ..Default::default()
        });
        forest.fit(&scaled, &labels, 2).unwrap();
        TabularModel::native(forest, scaler).unwrap()
    }

    fn png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([40, 160, 40])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn reading(temperature: f64) -> EnvironmentalReading {
        EnvironmentalReading {
            maximum_temperature: temperature + 5.0,
            minimum_temperature: temperature - 5.0,
            temperature,
            precipitation: 2.0,
            soil_ph: 6.5,
            relative_humidity: 70.0,
        }
    }

    #[test]
    fn test_argmax_picks_label() {
        let engine = InferenceEngine::new(Box::new(Constant([0.1, 0.6, 0.2, 0.1])), tabular());
        let prediction = engine.predict_image(&png()).unwrap();

        assert_eq!(prediction.label, LeafCondition::BrownSpots);
        assert!((prediction.confidence - 0.6).abs() < 1e-6);
        assert_eq!(
            prediction.message(),
            "The rice plant is prone to Brown_spots with confidence 0.60."
        );
    }

    #[test]
    fn test_tie_takes_first_index() {
        let prediction = ImagePrediction::from_probabilities([0.25; 4]).unwrap();
        assert_eq!(prediction.label, LeafCondition::BacterialLeafBlight);
    }

    #[test]
    fn test_nan_output_rejected() {
        assert!(ImagePrediction::from_probabilities([f32::NAN, 0.5, 0.25, 0.25]).is_err());
    }

    #[test]
    fn test_bad_bytes_are_bad_input() {
        let engine = InferenceEngine::new(Box::new(Constant([0.0, 0.0, 1.0, 0.0])), tabular());
        let err = engine.predict_image(b"\x89PNG garbage").unwrap_err();
        assert!(err.is_bad_input());
    }

    #[test]
    fn test_environment_prediction() {
        let engine = InferenceEngine::new(Box::new(Constant([0.0, 0.0, 1.0, 0.0])), tabular());

        let good = engine.predict_environment(&reading(20.0)).unwrap();
        assert_eq!(good.condition, FieldCondition::Good);
        assert_eq!(good.message(), "The environmental conditions are good for the rice plant.");

        let bad = engine.predict_environment(&reading(42.0)).unwrap();
        assert_eq!(bad.condition, FieldCondition::Bad);
    }

    #[test]
    fn test_tabular_rejects_mismatched_widths() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let mut forest = RandomForest::new(ForestConfig::default());
        forest.fit(&[[1.0, 2.0], [3.0, 4.0]], &[0, 1], 2).unwrap();

        assert!(TabularModel::native(forest, scaler).is_err());
    }

    #[test]
    fn test_tabular_seams() {
        let model = TabularModel::new(Box::new(Identity), Box::new(Threshold(0.7)));
        assert_eq!(format!("{:?}", model), "TabularModel { scaler: \"identity\", classifier: \"threshold\" }");

        let good = model.predict(&reading(1.0)).unwrap();
        assert_eq!(good.condition, FieldCondition::Good);
        assert!((good.confidence - 0.7).abs() < 1e-12);
        assert_eq!(model.predict(&reading(-1.0)).unwrap().condition, FieldCondition::Bad);

        let broken = TabularModel::new(Box::new(Identity), Box::new(Threshold(f64::NAN)));
        assert!(matches!(
            broken.predict(&reading(1.0)).unwrap_err(),
            InferenceError::InferenceFailed(_)
        ));
    }

    #[test]
    fn test_standard_scaler_seam() {
        let scaler = StandardScaler::from_parts(vec![1.0; FEATURE_COUNT], vec![2.0; FEATURE_COUNT]).unwrap();
        let scaled = FeatureScaler::transform(&scaler, &[3.0; FEATURE_COUNT]).unwrap();
        assert_eq!(scaled, [1.0; FEATURE_COUNT]);
        assert_eq!(FeatureScaler::name(&scaler), "standard-scaler");
    }
}
