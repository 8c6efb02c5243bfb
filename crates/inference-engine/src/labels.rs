//! Output label sets

use serde::{Deserialize, Serialize};

/// Number of leaf condition classes produced by the image model
pub const NUM_LEAF_CLASSES: usize = 4;

/// Leaf condition predicted from an image, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafCondition {
    #[serde(rename = "Bacterial_leaf_blight")]
    BacterialLeafBlight,
    #[serde(rename = "Brown_spots")]
    BrownSpots,
    Healthy,
    #[serde(rename = "Leaf_smut")]
    LeafSmut,
}

impl LeafCondition {
    /// All classes indexed by model output position
    pub const ALL: [LeafCondition; NUM_LEAF_CLASSES] = [
        LeafCondition::BacterialLeafBlight,
        LeafCondition::BrownSpots,
        LeafCondition::Healthy,
        LeafCondition::LeafSmut,
    ];

    /// Map a model output index to its label
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafCondition::BacterialLeafBlight => "Bacterial_leaf_blight",
            LeafCondition::BrownSpots => "Brown_spots",
            LeafCondition::Healthy => "Healthy",
            LeafCondition::LeafSmut => "Leaf_smut",
        }
    }

    /// User-facing sentence with the confidence rounded to two decimals
    pub fn message(&self, confidence: f32) -> String {
        match self {
            LeafCondition::Healthy => {
                format!("The rice plant is healthy with confidence {:.2}.", confidence)
            }
            disease => format!(
                "The rice plant is prone to {} with confidence {:.2}.",
                disease.as_str(),
                confidence
            ),
        }
    }
}

/// Growing conditions predicted from environmental readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCondition {
    Bad,
    Good,
}

impl FieldCondition {
    /// Map the classifier's class index (0 = Bad, 1 = Good)
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(FieldCondition::Bad),
            1 => Some(FieldCondition::Good),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCondition::Bad => "Bad",
            FieldCondition::Good => "Good",
        }
    }

    /// Advisory shown to the farmer
    pub fn message(&self) -> &'static str {
        match self {
            FieldCondition::Good => "The environmental conditions are good for the rice plant.",
            FieldCondition::Bad => {
                "The environmental conditions are not good for the rice plants. Protect the crops."
            }
        }
    }
}
