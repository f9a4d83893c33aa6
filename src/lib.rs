//! Voice recording → health-risk assessment.
//!
//! A recording is validated, resampled and trimmed, reduced to a fixed
//! vector of acoustic features, scored by a pre-trained binary classifier,
//! and turned into user-facing scores and a persisted analysis record.

pub mod audio;
pub mod classifier;
pub mod config;
pub mod features;
pub mod pipeline;
pub mod report;
pub mod scoring;


pub use audio::{AudioAsset, AudioFormat, AudioValidationError, ValidationReport};
pub use classifier::{
    ArtifactError, Classifier, ClassifierGateway, GatewayState, InferenceError, Prediction,
};
pub use config::Config;
pub use features::{to_ordered_array, FeatureVector, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
pub use pipeline::{Assessment, Pipeline, PipelineError};
pub use report::{AnalysisRecord, RecordingContext};
pub use scoring::{PredictionResult, RiskLevel, Status};
