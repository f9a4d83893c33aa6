//! Assembly of the persisted analysis record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::audio::{AudioFormat, ValidationReport};
use crate::features::{DisplayFeatures, FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::scoring::{PredictionResult, RiskLevel, Status, VocalMetrics};

/// Environment label used when the caller doesn't supply one
pub const UNKNOWN_ENVIRONMENT: &str = "Unknown";

/// Caller-supplied facts about a recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingContext {
    pub recording_id: Uuid,
    pub user_id: Option<String>,
    /// When the recording was made
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    /// When the record is produced
    pub created_at: DateTime<Utc>,
}

impl RecordingContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            recording_id: Uuid::new_v4(),
            user_id: None,
            timestamp: now,
            environment: UNKNOWN_ENVIRONMENT.to_string(),
            created_at: now,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallResult {
    pub status: Status,
    pub label: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    pub environment: String,
    pub sample_rate: u32,
    pub format: AudioFormat,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternChart {
    /// Percentages for normal, attention and alert patterns
    pub data: [u8; 3],
}

/// Historical series; empty until per-user history is stored
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendChart {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charts {
    pub pattern: PatternChart,
    pub trend: TrendChart,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlPrediction {
    pub prediction_class: u8,
    pub probability: f64,
}

/// Complete result of one analysis, ready to persist or print
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub recording_id: Uuid,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "healthScore")]
    pub health_score: u8,
    #[serde(rename = "overallResult")]
    pub overall_result: OverallResult,
    pub confidence: u8,
    pub severity: RiskLevel,
    pub metrics: VocalMetrics,
    #[serde(rename = "recordingInfo")]
    pub recording_info: RecordingInfo,
    pub charts: Charts,
    pub features: DisplayFeatures,
    pub raw_features: FeatureVector,
    pub ml_prediction: MlPrediction,
    pub feature_schema_version: u32,
    pub created_at: DateTime<Utc>,
}

/// Pattern distribution shown for a health score
pub fn pattern_distribution(health_score: u8) -> [u8; 3] {
    if health_score >= 80 {
        [80, 15, 5]
    } else if health_score >= 60 {
        [60, 30, 10]
    } else {
        [40, 35, 25]
    }
}

pub fn assemble(
    report: &ValidationReport,
    features: &FeatureVector,
    result: &PredictionResult,
    context: &RecordingContext,
) -> AnalysisRecord {
    let status = result.status();

    AnalysisRecord {
        recording_id: context.recording_id,
        user_id: context.user_id.clone(),
        timestamp: context.timestamp,
        health_score: result.health_score(),
        overall_result: OverallResult {
            status,
            label: status.label(),
            description: status.description(),
        },
        confidence: result.confidence(),
        severity: result.risk_level(),
        metrics: *result.vocal_metrics(),
        recording_info: RecordingInfo {
            id: context.recording_id,
            timestamp: context.timestamp,
            duration: report.duration_secs,
            environment: context.environment.clone(),
            sample_rate: report.sample_rate,
            format: report.format,
            size_bytes: report.size_bytes,
        },
        charts: Charts {
            pattern: PatternChart {
                data: pattern_distribution(result.health_score()),
            },
            trend: TrendChart::default(),
        },
        features: features.display_groups(),
        raw_features: *features,
        ml_prediction: MlPrediction {
            prediction_class: result.predicted_class(),
            probability: result.probability(),
        },
        feature_schema_version: FEATURE_SCHEMA_VERSION,
        created_at: context.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Prediction;
    use crate::scoring::derive;

    fn report() -> ValidationReport {
        ValidationReport {
            duration_secs: 20.0,
            sample_rate: 44100,
            channels: 1,
            size_bytes: 1_764_044,
            format: AudioFormat::Wav,
        }
    }

    #[test]
    fn test_pattern_distribution() {
        assert_eq!(pattern_distribution(100), [80, 15, 5]);
        assert_eq!(pattern_distribution(80), [80, 15, 5]);
        assert_eq!(pattern_distribution(79), [60, 30, 10]);
        assert_eq!(pattern_distribution(60), [60, 30, 10]);
        assert_eq!(pattern_distribution(59), [40, 35, 25]);
        assert_eq!(pattern_distribution(0), [40, 35, 25]);
    }

    #[test]
    fn test_assemble_alert() {
        let mut features = FeatureVector::zeros();
        features.set("pitch_mean", 180.0);
        let result = derive(
            Prediction {
                class: 1,
                probability: 0.9,
            },
            &features,
        );
        let context = RecordingContext::new()
            .with_user("user-1")
            .with_environment("Quiet room");

        let record = assemble(&report(), &features, &result, &context);

        assert_eq!(record.overall_result.status, Status::Alert);
        assert_eq!(record.overall_result.label, "Consultation Advised");
        assert_eq!(record.health_score, 10);
        assert_eq!(record.severity, RiskLevel::High);
        assert_eq!(record.charts.pattern.data, [40, 35, 25]);
        assert_eq!(record.recording_info.id, context.recording_id);
        assert_eq!(record.recording_info.environment, "Quiet room");
        assert_eq!(record.features.pitch.mean, 180.0);
        assert_eq!(record.raw_features.get("pitch_mean"), Some(180.0));
        assert_eq!(record.ml_prediction.prediction_class, 1);
    }

    #[test]
    fn test_record_json_shape() {
        let features = FeatureVector::zeros();
        let result = derive(
            Prediction {
                class: 0,
                probability: 0.1,
            },
            &features,
        );
        let record = assemble(&report(), &features, &result, &RecordingContext::new());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["overallResult"]["status"], "normal");
        assert_eq!(json["overallResult"]["label"], "Healthy Voice Patterns");
        assert_eq!(json["severity"], "low");
        assert_eq!(json["healthScore"], 90);
        assert_eq!(json["recordingInfo"]["environment"], "Unknown");
        assert_eq!(json["recordingInfo"]["format"], "wav");
        assert!(json["user_id"].is_null());
        assert!(json["charts"]["trend"]["data"].as_array().unwrap().is_empty());
        assert_eq!(json["raw_features"].as_object().unwrap().len(), 39);
        assert_eq!(json["feature_schema_version"], 1);
    }
}
