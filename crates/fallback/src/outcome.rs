//! Load outcome types

use serde::Serialize;

/// A model together with how it was obtained
#[derive(Debug, Clone)]
pub enum LoadOutcome<M> {
    /// Built from the trained artifact
    Loaded(M),
    /// Placeholder substituted because the artifact could not be used
    Fallback { model: M, reason: String },
}

impl<M> LoadOutcome<M> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, LoadOutcome::Fallback { .. })
    }

    pub fn model(&self) -> &M {
        match self {
            LoadOutcome::Loaded(model) | LoadOutcome::Fallback { model, .. } => model,
        }
    }

    pub fn into_model(self) -> M {
        match self {
            LoadOutcome::Loaded(model) | LoadOutcome::Fallback { model, .. } => model,
        }
    }

    /// Why the placeholder was used
    pub fn reason(&self) -> Option<&str> {
        match self {
            LoadOutcome::Loaded(_) => None,
            LoadOutcome::Fallback { reason, .. } => Some(reason),
        }
    }

    /// Status summary without the model
    pub fn status(&self) -> ArtifactStatus {
        ArtifactStatus {
            loaded: true,
            fallback: self.is_fallback(),
            reason: self.reason().map(str::to_string),
        }
    }
}

/// Per-artifact health summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    /// A usable model occupies the slot (trained or placeholder)
    pub loaded: bool,
    /// The slot holds a placeholder
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_status() {
        let outcome = LoadOutcome::Loaded(1);
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.status(), ArtifactStatus { loaded: true, fallback: false, reason: None });
        assert_eq!(outcome.into_model(), 1);
    }

    #[test]
    fn test_fallback_status() {
        let outcome = LoadOutcome::Fallback {
            model: "placeholder",
            reason: "missing".to_string(),
        };
        assert!(outcome.is_fallback());
        assert_eq!(outcome.reason(), Some("missing"));
        assert!(outcome.status().loaded);
        assert_eq!(*outcome.model(), "placeholder");
    }
}
