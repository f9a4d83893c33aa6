use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::artifact::read_artifact;
use super::ArtifactError;

/// On-disk scaler description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    /// `(x - mean) / scale`
    Standard {
        feature_names: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
        #[serde(default)]
        training_run: Option<String>,
    },
    /// `(x - data_min) / data_range`
    MinMax {
        feature_names: Vec<String>,
        data_min: Vec<f64>,
        data_range: Vec<f64>,
        #[serde(default)]
        training_run: Option<String>,
    },
}

/// Fitted affine feature scaler: `(x - offset) / divisor`
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    feature_names: Vec<String>,
    offset: Array1<f64>,
    divisor: Array1<f64>,
    training_run: Option<String>,
}

impl FeatureScaler {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: ScalerArtifact = read_artifact(path)?;
        Self::from_artifact(artifact).map_err(|reason| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_artifact(artifact: ScalerArtifact) -> Result<Self, String> {
        let (feature_names, offset, divisor, training_run) = match artifact {
            ScalerArtifact::Standard {
                feature_names,
                mean,
                scale,
                training_run,
            } => (feature_names, mean, scale, training_run),
            ScalerArtifact::MinMax {
                feature_names,
                data_min,
                data_range,
                training_run,
            } => (feature_names, data_min, data_range, training_run),
        };

        let n = feature_names.len();
        if n == 0 {
            return Err("scaler has no features".to_string());
        }
        if offset.len() != n || divisor.len() != n {
            return Err(format!(
                "scaler parameter lengths ({}, {}) don't match {} feature names",
                offset.len(),
                divisor.len(),
                n
            ));
        }
        if offset.iter().chain(divisor.iter()).any(|v| !v.is_finite()) {
            return Err("scaler contains non-finite parameters".to_string());
        }

        // Constant features were fitted with zero spread
        let divisor: Array1<f64> = divisor
            .into_iter()
            .map(|d| if d == 0.0 { 1.0 } else { d })
            .collect();

        debug!("Scaler ready: {} features", n);

        Ok(Self {
            feature_names,
            offset: Array1::from(offset),
            divisor,
            training_run,
        })
    }

    /// Standard scaler with identity parameters over the given names
    pub fn identity<S: AsRef<str>>(names: &[S]) -> Self {
        let n = names.len();
        Self {
            feature_names: names.iter().map(|s| s.as_ref().to_string()).collect(),
            offset: Array1::zeros(n),
            divisor: Array1::ones(n),
            training_run: None,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn training_run(&self) -> Option<&str> {
        self.training_run.as_deref()
    }

    /// Scale one sample; the caller guarantees `x.len() == n_features()`
    pub fn transform(&self, x: &[f64]) -> Array1<f64> {
        (&ArrayView1::from(x) - &self.offset) / &self.divisor
    }
}
