//! Random forest classifier
//!
//! CART trees grown on bootstrap samples with Gini impurity. Each tree is a
//! flat node array in pre-order (children always follow their parent).
//! Fitted in-process only; trained forests are served through ONNX.

use crate::engine::TabularClassifier;
use crate::InferenceError;
use preprocessing::FEATURE_COUNT;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (None = grow until pure)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    /// RNG seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Samples with `row[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class distribution of the training samples that reached this leaf
    Leaf { value: Vec<f64> },
}

/// Single decision tree, root at index 0
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Class distribution for one row
    fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { value } => return value,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    config: ForestConfig,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Create an unfitted forest
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            n_features: 0,
            n_classes: 0,
            trees: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Fit on rows `x` with class labels `y` in `0..n_classes`
    pub fn fit<R: AsRef<[f64]>>(
        &mut self,
        x: &[R],
        y: &[usize],
        n_classes: usize,
    ) -> Result<(), InferenceError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{} labels", x.len()),
                actual: format!("{} labels", y.len()),
            });
        }
        let n_features = x[0].as_ref().len();
        if let Some(row) = x.iter().find(|r| r.as_ref().len() != n_features) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{} features", n_features),
                actual: format!("{} features", row.as_ref().len()),
            });
        }
        if let Some(label) = y.iter().find(|&&c| c >= n_classes) {
            return Err(InferenceError::InvalidModel(format!(
                "label {} outside 0..{}",
                label, n_classes
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let max_features = ((n_features as f64).sqrt() as usize).max(1);

        let trees = (0..self.config.n_estimators.max(1))
            .map(|_| {
                let samples: Vec<usize> = if self.config.bootstrap {
                    (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect()
                } else {
                    (0..x.len()).collect()
                };
                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    max_features,
                    config: &self.config,
                    rng: StdRng::seed_from_u64(rng.gen()),
                    nodes: Vec::new(),
                };
                builder.grow(&samples, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Fitted random forest: {} trees on {} samples x {} features",
            trees.len(),
            x.len(),
            n_features
        );

        self.trees = trees;
        self.n_features = n_features;
        self.n_classes = n_classes;
        Ok(())
    }

    /// Mean class distribution over all trees
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if !self.is_fitted() {
            return Err(InferenceError::InvalidModel("forest is not fitted".into()));
        }
        if row.len() != self.n_features {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", row.len()),
            });
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    /// Most probable class (lowest index wins ties)
    pub fn predict(&self, row: &[f64]) -> Result<usize, InferenceError> {
        let proba = self.predict_proba(row)?;
        Ok(argmax(&proba))
    }
}

impl TabularClassifier for RandomForest {
    fn name(&self) -> &'static str {
        "random-forest"
    }

    fn predict_proba(&self, features: &[f64; FEATURE_COUNT]) -> Result<[f64; 2], InferenceError> {
        let proba = RandomForest::predict_proba(self, features)?;
        proba.try_into().map_err(|v: Vec<f64>| {
            InferenceError::InvalidModel(format!("forest has {} classes, expected 2", v.len()))
        })
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

struct TreeBuilder<'a, R> {
    x: &'a [R],
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    config: &'a ForestConfig,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl<'a, R: AsRef<[f64]>> TreeBuilder<'a, R> {
    fn class_counts(&self, samples: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1.0;
        }
        counts
    }

    fn leaf(&mut self, counts: Vec<f64>) -> usize {
        let total: f64 = counts.iter().sum();
        let value = counts.into_iter().map(|c| c / total).collect();
        self.nodes.push(Node::Leaf { value });
        self.nodes.len() - 1
    }

    fn grow(&mut self, samples: &[usize], depth: usize) -> usize {
        let counts = self.class_counts(samples);
        let pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;
        let depth_reached = self.config.max_depth.map_or(false, |d| depth >= d);

        if pure || depth_reached || samples.len() < self.config.min_samples_split {
            return self.leaf(counts);
        }

        let Some((feature, threshold)) = self.best_split(samples) else {
            return self.leaf(counts);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[i].as_ref()[feature] <= threshold);

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });
        let left_id = self.grow(&left, depth + 1);
        let right_id = self.grow(&right, depth + 1);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    /// Lowest weighted Gini split over a random feature subset. Keeps
    /// inspecting further features until at least one valid split exists.
    fn best_split(&mut self, samples: &[usize]) -> Option<(usize, f64)> {
        let n_features = self.x[0].as_ref().len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(&mut self.rng);

        let total = self.class_counts(samples);
        let n = samples.len() as f64;
        let mut best: Option<(usize, f64, f64)> = None;

        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            let mut sorted: Vec<(f64, usize)> = samples
                .iter()
                .map(|&i| (self.x[i].as_ref()[feature], self.y[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0.0; self.n_classes];
            for k in 0..sorted.len() - 1 {
                left[sorted[k].1] += 1.0;
                let (v, next) = (sorted[k].0, sorted[k + 1].0);
                if v >= next {
                    continue;
                }

                let n_left = (k + 1) as f64;
                let n_right = n - n_left;
                let right: Vec<f64> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
                let impurity = (n_left * gini(&left, n_left) + n_right * gini(&right, n_right)) / n;

                if best.map_or(true, |(_, _, b)| impurity < b) {
                    let mut threshold = v + (next - v) / 2.0;
                    if threshold >= next {
                        threshold = v;
                    }
                    best = Some((feature, threshold, impurity));
                }
            }
        }

        if let Some((feature, threshold, impurity)) = best {
            debug!(
                "Split on feature {} at {:.4} (impurity {:.4}, {} samples)",
                feature,
                threshold,
                impurity,
                samples.len()
            );
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn gini(counts: &[f64], n: f64) -> f64 {
    1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
}
