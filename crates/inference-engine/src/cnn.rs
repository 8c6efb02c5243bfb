//! Native sequential CNN
//!
//! Conv2D(32, 3x3, ReLU) -> MaxPool(2x2) -> Flatten -> Dense(4) -> softmax,
//! evaluated on `ndarray`. Used when no trained graph can be loaded, so the
//! weights come from a seeded Glorot-uniform initialization.

use crate::engine::ImageClassifier;
use crate::labels::NUM_LEAF_CLASSES;
use crate::InferenceError;
use ndarray::{s, Array1, Array2, Axis};
use preprocessing::{ImageTensor, IMAGE_CHANNELS, IMAGE_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const FILTERS: usize = 32;
const KERNEL: usize = 3;
const POOL: usize = 2;
const CONV_OUT: usize = IMAGE_SIZE as usize - KERNEL + 1;
const POOL_OUT: usize = CONV_OUT / POOL;
const PATCH_LEN: usize = KERNEL * KERNEL * IMAGE_CHANNELS;
const FLATTENED: usize = POOL_OUT * POOL_OUT * FILTERS;

/// Small CNN with the same input and output shape as the trained classifier
pub struct SequentialCnn {
    /// Convolution kernel, rows ordered (ky, kx, channel), one column per filter
    kernel: Array2<f32>,
    conv_bias: Array1<f32>,
    /// Dense weights, rows in NHWC flatten order of the pooled map
    dense: Array2<f32>,
    dense_bias: Array1<f32>,
}

impl SequentialCnn {
    /// Untrained network with Glorot-uniform weights and zero biases
    pub fn glorot(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let conv_limit = glorot_limit(PATCH_LEN, KERNEL * KERNEL * FILTERS);
        let kernel =
            Array2::from_shape_fn((PATCH_LEN, FILTERS), |_| rng.gen_range(-conv_limit..conv_limit));

        let dense_limit = glorot_limit(FLATTENED, NUM_LEAF_CLASSES);
        let dense = Array2::from_shape_fn((FLATTENED, NUM_LEAF_CLASSES), |_| {
            rng.gen_range(-dense_limit..dense_limit)
        });

        debug!(
            "Initialized sequential CNN: {} conv + {} dense weights (seed {})",
            kernel.len(),
            dense.len(),
            seed
        );

        Self {
            kernel,
            conv_bias: Array1::zeros(FILTERS),
            dense,
            dense_bias: Array1::zeros(NUM_LEAF_CLASSES),
        }
    }

    /// Convolution with ReLU as a (positions x filters) matrix
    fn conv_relu(&self, input: &ImageTensor) -> Array2<f32> {
        let image = input.as_array().index_axis(Axis(0), 0);

        let mut patches = Array2::<f32>::zeros((CONV_OUT * CONV_OUT, PATCH_LEN));
        for y in 0..CONV_OUT {
            for x in 0..CONV_OUT {
                let window = image.slice(s![y..y + KERNEL, x..x + KERNEL, ..]);
                patches
                    .row_mut(y * CONV_OUT + x)
                    .iter_mut()
                    .zip(window.iter())
                    .for_each(|(dst, src)| *dst = *src);
            }
        }

        let mut conv = patches.dot(&self.kernel) + &self.conv_bias;
        conv.mapv_inplace(|v| v.max(0.0));
        conv
    }

    /// 2x2 max pooling, flattened in (y, x, filter) order
    fn max_pool(conv: &Array2<f32>) -> Array1<f32> {
        let mut pooled = Array1::<f32>::from_elem(FLATTENED, f32::NEG_INFINITY);
        for py in 0..POOL_OUT {
            for px in 0..POOL_OUT {
                let base = (py * POOL_OUT + px) * FILTERS;
                for dy in 0..POOL {
                    for dx in 0..POOL {
                        let row = conv.row((py * POOL + dy) * CONV_OUT + px * POOL + dx);
                        for (f, v) in row.iter().enumerate() {
                            let slot = &mut pooled[base + f];
                            *slot = slot.max(*v);
                        }
                    }
                }
            }
        }
        pooled
    }
}

impl ImageClassifier for SequentialCnn {
    fn name(&self) -> &'static str {
        "sequential-cnn"
    }

    fn predict_proba(&self, input: &ImageTensor) -> Result<[f32; NUM_LEAF_CLASSES], InferenceError> {
        let conv = self.conv_relu(input);
        let pooled = Self::max_pool(&conv);
        let logits = pooled.dot(&self.dense) + &self.dense_bias;
        Ok(softmax(logits.iter().copied()))
    }
}

fn glorot_limit(fan_in: usize, fan_out: usize) -> f32 {
    (6.0 / (fan_in + fan_out) as f32).sqrt()
}

fn softmax(logits: impl IntoIterator<Item = f32>) -> [f32; NUM_LEAF_CLASSES] {
    let mut out = [0.0; NUM_LEAF_CLASSES];
    for (o, l) in out.iter_mut().zip(logits) {
        *o = l;
    }
    let max = out.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    out.iter_mut().for_each(|o| *o = (*o - max).exp());
    let sum: f32 = out.iter().sum();
    out.iter_mut().for_each(|o| *o /= sum);
    out
}
