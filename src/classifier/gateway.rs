use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::artifact::load_classifier;
use super::scaler::FeatureScaler;
use super::{ArtifactError, Classifier, InferenceError, Prediction};
use crate::features::{to_ordered_array, FeatureVector, FEATURE_NAMES};

/// Lifecycle of the gateway's artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Unloaded,
    Loaded,
    LoadFailed,
}

/// Where the reported probability comes from, fixed at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbabilityStrategy {
    /// The classifier's own probability estimate
    Native,
    /// Logistic squashing of the decision function
    DecisionSigmoid,
    /// Predicted label reported as 0.0 or 1.0
    HardLabel,
}

impl ProbabilityStrategy {
    pub fn for_classifier(classifier: &dyn Classifier) -> Self {
        if classifier.supports_probability() {
            Self::Native
        } else if classifier.supports_decision_function() {
            Self::DecisionSigmoid
        } else {
            Self::HardLabel
        }
    }
}

struct LoadedArtifacts {
    classifier: Box<dyn Classifier>,
    scaler: FeatureScaler,
    strategy: ProbabilityStrategy,
}

/// Owns the scaler + classifier pair and scores feature vectors.
///
/// Loaded once, then shared read-only (typically behind an `Arc`).
pub struct ClassifierGateway {
    state: GatewayState,
    artifacts: Option<LoadedArtifacts>,
}

impl ClassifierGateway {
    pub fn new() -> Self {
        Self {
            state: GatewayState::Unloaded,
            artifacts: None,
        }
    }

    /// Build a loaded gateway from in-memory artifacts.
    ///
    /// Checks that the pair agree on feature count and training run; the
    /// scaler's names are not required to be the canonical ones.
    pub fn with_artifacts(
        classifier: Box<dyn Classifier>,
        scaler: FeatureScaler,
    ) -> Result<Self, ArtifactError> {
        check_pair(classifier.as_ref(), &scaler)?;
        let strategy = ProbabilityStrategy::for_classifier(classifier.as_ref());
        Ok(Self {
            state: GatewayState::Loaded,
            artifacts: Some(LoadedArtifacts {
                classifier,
                scaler,
                strategy,
            }),
        })
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == GatewayState::Loaded
    }

    pub fn strategy(&self) -> Option<ProbabilityStrategy> {
        self.artifacts.as_ref().map(|a| a.strategy)
    }

    /// Load both artifacts. Either both are installed or neither is; a failed
    /// load discards anything previously loaded.
    pub fn load(&mut self, model_path: &Path, scaler_path: &Path) -> Result<(), ArtifactError> {
        let start = Instant::now();
        match Self::load_pair(model_path, scaler_path) {
            Ok(artifacts) => {
                info!(
                    "Classifier ready: {} with {:?} probabilities ({} features, {}ms)",
                    artifacts.classifier.kind(),
                    artifacts.strategy,
                    artifacts.scaler.n_features(),
                    start.elapsed().as_millis()
                );
                self.artifacts = Some(artifacts);
                self.state = GatewayState::Loaded;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load classifier artifacts: {}", e);
                self.artifacts = None;
                self.state = GatewayState::LoadFailed;
                Err(e)
            }
        }
    }

    fn load_pair(model_path: &Path, scaler_path: &Path) -> Result<LoadedArtifacts, ArtifactError> {
        let classifier = load_classifier(model_path)?;
        let scaler = FeatureScaler::load(scaler_path)?;
        check_pair(classifier.as_ref(), &scaler)?;

        if let Some((position, (expected, found))) = FEATURE_NAMES
            .iter()
            .zip(scaler.feature_names())
            .enumerate()
            .find(|(_, (expected, found))| **expected != found.as_str())
        {
            return Err(ArtifactError::Incompatible(format!(
                "scaler feature {} is '{}', expected '{}'",
                position, found, expected
            )));
        }
        if scaler.n_features() != FEATURE_NAMES.len() {
            return Err(ArtifactError::Incompatible(format!(
                "scaler has {} features, extractor produces {}",
                scaler.n_features(),
                FEATURE_NAMES.len()
            )));
        }

        let strategy = ProbabilityStrategy::for_classifier(classifier.as_ref());
        Ok(LoadedArtifacts {
            classifier,
            scaler,
            strategy,
        })
    }

    /// Score an already-ordered feature array
    pub fn predict(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        let artifacts = self.artifacts.as_ref().ok_or(InferenceError::NotLoaded)?;

        let expected = artifacts.scaler.n_features();
        if features.len() != expected {
            return Err(InferenceError::FeatureCountMismatch {
                expected,
                found: features.len(),
            });
        }
        if let Some(position) = features.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteFeature {
                position,
                name: artifacts.scaler.feature_names()[position].clone(),
            });
        }

        let scaled = artifacts.scaler.transform(features).to_vec();
        let classifier = artifacts.classifier.as_ref();

        let (class, probability) = match artifacts.strategy {
            ProbabilityStrategy::Native => {
                let p = classifier
                    .predict_probability(&scaled)
                    .ok_or(InferenceError::InvalidProbability(f64::NAN))?;
                (u8::from(p > 0.5), p)
            }
            ProbabilityStrategy::DecisionSigmoid => {
                let d = classifier
                    .decision_function(&scaled)
                    .ok_or(InferenceError::InvalidProbability(f64::NAN))?;
                (u8::from(d > 0.0), 1.0 / (1.0 + (-d).exp()))
            }
            ProbabilityStrategy::HardLabel => {
                let label = classifier.predict_label(&scaled);
                (label, f64::from(label))
            }
        };

        if !probability.is_finite() {
            return Err(InferenceError::InvalidProbability(probability));
        }
        let probability = probability.clamp(0.0, 1.0);

        debug!(class, probability, "Prediction complete");
        Ok(Prediction { class, probability })
    }

    /// Score a named feature vector, checking names against the scaler's
    pub fn predict_features(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        let artifacts = self.artifacts.as_ref().ok_or(InferenceError::NotLoaded)?;
        let fitted = artifacts.scaler.feature_names();

        if fitted.len() != features.names().len() {
            return Err(InferenceError::FeatureCountMismatch {
                expected: fitted.len(),
                found: features.names().len(),
            });
        }
        for (position, (found, expected)) in features.names().iter().zip(fitted).enumerate() {
            if *found != expected.as_str() {
                return Err(InferenceError::FeatureOrderMismatch {
                    position,
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }

        self.predict(&to_ordered_array(features))
    }
}

impl Default for ClassifierGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn check_pair(classifier: &dyn Classifier, scaler: &FeatureScaler) -> Result<(), ArtifactError> {
    if classifier.n_features() != scaler.n_features() {
        return Err(ArtifactError::Incompatible(format!(
            "classifier expects {} features, scaler has {}",
            classifier.n_features(),
            scaler.n_features()
        )));
    }
    if let (Some(model_run), Some(scaler_run)) = (classifier.training_run(), scaler.training_run()) {
        if model_run != scaler_run {
            return Err(ArtifactError::Incompatible(format!(
                "classifier from training run '{}', scaler from '{}'",
                model_run, scaler_run
            )));
        }
    }
    Ok(())
}
