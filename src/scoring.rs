//! # Score Derivation
//!
//! Maps a classifier probability onto user-facing scores. All mappings are
//! pure functions of the probability, except the vocal metrics which also
//! read a handful of raw features.
//!
//! | Probability | Risk | Status |
//! |-------------|------|--------|
//! | `p < 0.3` | low | normal |
//! | `0.3 <= p < 0.7` | medium | warning |
//! | `p >= 0.7` | high | alert |

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;

use crate::classifier::Prediction;
use crate::features::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warning,
    Alert,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Alert => "alert",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Healthy Voice Patterns",
            Self::Warning => "Attention Recommended",
            Self::Alert => "Consultation Advised",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => {
                "Your voice analysis shows patterns within normal ranges. No significant anomalies detected."
            }
            Self::Warning => {
                "Some voice patterns require attention. Consider implementing the recommendations below."
            }
            Self::Alert => {
                "Significant voice pattern deviations detected. Consult a healthcare professional for further evaluation."
            }
        }
    }
}

impl From<RiskLevel> for Status {
    fn from(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Low => Self::Normal,
            RiskLevel::Medium => Self::Warning,
            RiskLevel::High => Self::Alert,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn risk_level(probability: f64) -> RiskLevel {
    if probability < 0.3 {
        RiskLevel::Low
    } else if probability < 0.7 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Distance from the decision boundary as a percentage, floored at 50
pub fn confidence(probability: f64) -> u8 {
    ((probability - 0.5).abs() * 200.0).round_ties_even().clamp(50.0, 100.0) as u8
}

/// 100 for certainly healthy, 0 for certainly at risk
pub fn health_score(probability: f64) -> u8 {
    ((1.0 - probability) * 100.0).round_ties_even().clamp(0.0, 100.0) as u8
}

/// A 0-100 metric with its recent direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricValue {
    pub value: u8,
    pub trend: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocalMetrics {
    pub pitch_stability: MetricValue,
    pub voice_clarity: MetricValue,
    pub breath_control: MetricValue,
    pub consistency: MetricValue,
}

/// Clamp to [0, 100] and drop the fractional part
fn metric(raw: f64) -> u8 {
    if raw.is_finite() {
        raw.clamp(0.0, 100.0).trunc() as u8
    } else {
        0
    }
}

/// Heuristic 0-100 metrics from raw features.
///
/// Trends are placeholders until per-user history exists: they are drawn
/// from a generator seeded with the health score, so identical scores give
/// identical trends.
pub fn vocal_metrics(features: &FeatureVector, health_score: u8) -> VocalMetrics {
    let mut rng = StdRng::seed_from_u64(u64::from(health_score));
    let mut with_trend = |value: u8| MetricValue {
        value,
        trend: rng.gen_range(-2..=2),
    };

    VocalMetrics {
        pitch_stability: with_trend(metric(100.0 - features.value("pitch_std") * 10.0)),
        voice_clarity: with_trend(metric(features.value("hnr") * 5.0)),
        breath_control: with_trend(metric(100.0 - features.value("shimmer") * 1000.0)),
        consistency: with_trend(metric(100.0 - features.value("jitter") * 10.0)),
    }
}

/// Everything derived from one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    predicted_class: u8,
    probability: f64,
    risk_level: RiskLevel,
    status: Status,
    confidence: u8,
    health_score: u8,
    vocal_metrics: VocalMetrics,
}

impl PredictionResult {
    pub fn predicted_class(&self) -> u8 {
        self.predicted_class
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn health_score(&self) -> u8 {
        self.health_score
    }

    pub fn vocal_metrics(&self) -> &VocalMetrics {
        &self.vocal_metrics
    }
}

pub fn derive(prediction: Prediction, features: &FeatureVector) -> PredictionResult {
    let p = prediction.probability;
    let risk = risk_level(p);
    let health = health_score(p);
    PredictionResult {
        predicted_class: prediction.class,
        probability: p,
        risk_level: risk,
        status: Status::from(risk),
        confidence: confidence(p),
        health_score: health,
        vocal_metrics: vocal_metrics(features, health),
    }
}
