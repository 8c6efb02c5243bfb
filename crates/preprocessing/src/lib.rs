//! Request Preprocessing
//!
//! Turns raw request payloads into model inputs:
//! - Uploaded image bytes into a normalized `1x128x128x3` tensor
//! - Environmental readings into a fixed-order feature row
//! - Feature rows into standardized rows via a fitted scaler

mod error;
mod imaging;
mod scaler;
mod tabular;

pub use imaging::{preprocess_image, tensor_from_rgb, ImageTensor, IMAGE_CHANNELS, IMAGE_SIZE};
pub use error::PreprocessError;
pub use scaler::StandardScaler;
pub use tabular::{EnvironmentalReading, FEATURE_COUNT, FEATURE_NAMES};
