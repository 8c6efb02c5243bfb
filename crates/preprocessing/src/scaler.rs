//! Standard (z-score) feature scaling

use crate::PreprocessError;
use tracing::debug;

/// Per-feature standardization fitted on a batch of rows.
///
/// An unfitted scaler has empty parameter vectors and refuses to transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardScaler {
    /// Per-feature mean
    mean: Vec<f64>,
    /// Per-feature population standard deviation (zero replaced by 1.0)
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Create an unfitted scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit parameters
    pub fn from_parts(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, PreprocessError> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Check that the parameters are consistent and usable
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if !self.is_fitted() {
            return Err(PreprocessError::NotFitted);
        }
        if self.mean.len() != self.scale.len() {
            return Err(PreprocessError::InvalidParameters(format!(
                "mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(i) = self
            .mean
            .iter()
            .zip(&self.scale)
            .position(|(m, s)| !m.is_finite() || !s.is_finite() || *s == 0.0)
        {
            return Err(PreprocessError::InvalidParameters(format!(
                "feature {} has mean {} and scale {}",
                i, self.mean[i], self.scale[i]
            )));
        }
        Ok(())
    }

    /// Whether `fit` has run (or parameters were supplied)
    pub fn is_fitted(&self) -> bool {
        !self.mean.is_empty()
    }

    /// Number of features the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Fit mean and standard deviation per column
    pub fn fit<R: AsRef<[f64]>>(&mut self, rows: &[R]) -> Result<(), PreprocessError> {
        let width = match rows.first() {
            Some(row) => row.as_ref().len(),
            None => return Err(PreprocessError::EmptyInput),
        };
        if let Some(bad) = rows.iter().find(|r| r.as_ref().len() != width) {
            return Err(PreprocessError::FeatureCount {
                expected: width,
                actual: bad.as_ref().len(),
            });
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.as_ref()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; width];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row.as_ref()).zip(&mean) {
                let d = v - m;
                *var += d * d;
            }
        }

        self.scale = variance
            .into_iter()
            .map(|var| {
                let std_dev = (var / n).sqrt();
                if std_dev > f64::EPSILON {
                    std_dev
                } else {
                    1.0
                }
            })
            .collect();
        self.mean = mean;

        debug!("Fitted scaler on {} rows x {} features", rows.len(), width);
        Ok(())
    }

    /// Standardize a single row
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, PreprocessError> {
        if !self.is_fitted() {
            return Err(PreprocessError::NotFitted);
        }
        if row.len() != self.mean.len() {
            return Err(PreprocessError::FeatureCount {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }
}
