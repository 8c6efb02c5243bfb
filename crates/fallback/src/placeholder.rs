//! Placeholder models
//!
//! Placeholders have the right input and output shapes but carry no
//! knowledge; their predictions are not meaningful.

use inference_engine::{
    ForestConfig, ImageClassifier, InferenceError, RandomForest, SequentialCnn, TabularModel,
};
use preprocessing::{StandardScaler, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Rows of synthetic data the placeholder scaler and forest are fitted on
pub const SYNTHETIC_SAMPLES: usize = 10;

/// Trees in the placeholder forest
const PLACEHOLDER_ESTIMATORS: usize = 10;

/// Untrained CNN with seeded random weights
pub fn placeholder_image_model(seed: u64) -> Box<dyn ImageClassifier> {
    Box::new(SequentialCnn::glorot(seed))
}

/// Scaler and forest fitted on uniform random readings with random labels,
/// so transform and predict work without "not fitted" errors
pub fn placeholder_tabular_model(seed: u64) -> Result<TabularModel, InferenceError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<[f64; FEATURE_COUNT]> = (0..SYNTHETIC_SAMPLES).map(|_| rng.gen()).collect();
    let y: Vec<usize> = (0..SYNTHETIC_SAMPLES).map(|_| rng.gen_range(0..2)).collect();

    let mut scaler = StandardScaler::new();
    scaler.fit(&x)?;
    let scaled = x
        .iter()
        .map(|row| scaler.transform(row))
        .collect::<Result<Vec<_>, _>>()?;

    let mut forest = RandomForest::new(ForestConfig {
        n_estimators: PLACEHOLDER_ESTIMATORS,
        seed,
        ..Default::default()
    });
    forest.fit(&scaled, &y, 2)?;

    debug!(
        "Placeholder forest fitted on {} synthetic rows ({} labelled Good), {} nodes",
        SYNTHETIC_SAMPLES,
        y.iter().sum::<usize>(),
        forest.trees().iter().map(|t| t.node_count()).sum::<usize>()
    );
    TabularModel::native(forest, scaler)
}
