//! Environmental reading assembly

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of tabular features
pub const FEATURE_COUNT: usize = 6;

/// Feature names in the column order the tabular model was trained on
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Maximum_Temperature",
    "Minimum_Temperature",
    "Temperature",
    "Precipitation",
    "Soil_pH",
    "Relative_Humidity",
];

/// Field conditions submitted for the environmental check.
///
/// Only presence and type are enforced; values are not range checked.
/// Numeric strings such as `"35.0"` are accepted alongside JSON numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalReading {
    /// Daily maximum temperature (°C)
    #[serde(rename = "Maximum_Temperature", deserialize_with = "lenient_f64")]
    pub maximum_temperature: f64,
    /// Daily minimum temperature (°C)
    #[serde(rename = "Minimum_Temperature", deserialize_with = "lenient_f64")]
    pub minimum_temperature: f64,
    /// Average temperature (°C)
    #[serde(rename = "Temperature", deserialize_with = "lenient_f64")]
    pub temperature: f64,
    /// Precipitation (mm)
    #[serde(rename = "Precipitation", deserialize_with = "lenient_f64")]
    pub precipitation: f64,
    #[serde(rename = "Soil_pH", deserialize_with = "lenient_f64")]
    pub soil_ph: f64,
    /// Relative humidity (%)
    #[serde(rename = "Relative_Humidity", deserialize_with = "lenient_f64")]
    pub relative_humidity: f64,
}

impl EnvironmentalReading {
    /// Assemble the feature row in training column order
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.maximum_temperature,
            self.minimum_temperature,
            self.temperature,
            self.precipitation,
            self.soil_ph,
            self.relative_humidity,
        ]
    }
}

/// A JSON number, or a string holding one
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    struct LenientF64;

    impl<'de> Visitor<'de> for LenientF64 {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number or a numeric string")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(LenientF64)
}
