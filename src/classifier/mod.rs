//! Binary health-risk classifier.
//!
//! Loads a fitted scaler and classifier from JSON artifacts and turns an
//! ordered feature vector into a class label and probability:
//! 1. Validate shape (and names, when given a [`FeatureVector`](crate::features::FeatureVector))
//! 2. Scale with the fitted scaler
//! 3. Score with the classifier, using the best probability source it offers

pub mod artifact;
pub mod gateway;
pub mod scaler;

pub use artifact::{load_classifier, ForestClassifier, LinearClassifier, NearestCentroidClassifier};
pub use gateway::{ClassifierGateway, GatewayState, ProbabilityStrategy};
pub use scaler::FeatureScaler;

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors loading or pairing model artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Model artifact not found at path: {0}")]
    NotFound(PathBuf),

    #[error("Invalid model artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Incompatible model artifacts: {0}")]
    Incompatible(String),

    #[error("Cannot resolve model artifact location: {0}")]
    Unresolved(String),
}

/// Errors raised while scoring a feature vector
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Classifier not loaded")]
    NotLoaded,

    #[error("Feature count mismatch: expected {expected}, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("Feature order mismatch at position {position}: expected {expected}, got {found}")]
    FeatureOrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Non-finite value for feature {name} (position {position})")]
    NonFiniteFeature { position: usize, name: String },

    #[error("Classifier produced an invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("Analysis exceeded its {budget_ms}ms budget")]
    BudgetExceeded { budget_ms: u64 },

    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

/// Output of a single classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// 0 = healthy, 1 = at risk
    pub class: u8,
    /// Probability of class 1, in [0, 1]
    pub probability: f64,
}

/// A fitted binary classifier operating on scaled features.
///
/// Implementations advertise which outputs they support; the gateway picks
/// the richest one once at load time.
pub trait Classifier: Send + Sync {
    /// Short name of the model family, for logs
    fn kind(&self) -> &'static str;

    fn n_features(&self) -> usize;

    /// Identifier of the training run that produced this model
    fn training_run(&self) -> Option<&str> {
        None
    }

    fn supports_probability(&self) -> bool {
        false
    }

    fn supports_decision_function(&self) -> bool {
        false
    }

    /// Probability of class 1
    fn predict_probability(&self, _x: &[f64]) -> Option<f64> {
        None
    }

    /// Signed distance from the decision boundary; positive favours class 1
    fn decision_function(&self, _x: &[f64]) -> Option<f64> {
        None
    }

    fn predict_label(&self, x: &[f64]) -> u8;
}
