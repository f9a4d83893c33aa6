//! End-to-end analysis of one recording.
//!
//! validate → preprocess → extract → predict → derive → assemble
//!
//! The audio front end (validate, preprocess, extract) runs on a dedicated
//! worker thread when an analysis budget is configured. If the budget runs
//! out the caller gets [`InferenceError::BudgetExceeded`] and the worker is
//! told to stop; it checks between decode packets, resampler chunks, STFT
//! frames and pitch frames.

use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::{
    AudioAsset, AudioPreprocessor, AudioValidationError, AudioValidator, PreprocessedAudio,
    ValidationReport,
};
use crate::classifier::{ArtifactError, ClassifierGateway, InferenceError};
use crate::config::Config;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::report::{assemble, AnalysisRecord, RecordingContext};
use crate::scoring::{derive, RiskLevel, Status, VocalMetrics};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] AudioValidationError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Summary returned by [`Pipeline::predict_from_audio`]
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub status: Status,
    pub health_score: u8,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub probability: f64,
    pub predicted_class: u8,
    pub features: FeatureVector,
    pub vocal_metrics: VocalMetrics,
}

/// Output of the audio front end
#[derive(Debug, Clone)]
pub struct FrontEndOutput {
    pub report: ValidationReport,
    pub audio: PreprocessedAudio,
    pub features: FeatureVector,
}

/// The stages that only need the audio, shared with the worker thread
#[derive(Clone)]
struct FrontEnd {
    validator: AudioValidator,
    preprocessor: AudioPreprocessor,
    extractor: Arc<FeatureExtractor>,
}

impl FrontEnd {
    fn run(
        &self,
        asset: &AudioAsset,
        stop_flag: &AtomicBool,
    ) -> Result<FrontEndOutput, AudioValidationError> {
        let start = Instant::now();
        let (report, decoded) = self.validator.validate_and_decode(asset, Some(stop_flag))?;
        let validated_ms = start.elapsed().as_millis() as u64;

        let audio = self
            .preprocessor
            .process_decoded(decoded, Some(stop_flag))?;
        let preprocessed_ms = start.elapsed().as_millis() as u64;

        let features = self
            .extractor
            .extract_until(&audio.samples, audio.sample_rate, stop_flag)
            .ok_or(AudioValidationError::Cancelled)?;
        debug!(
            validated_ms,
            preprocessed_ms,
            total_ms = start.elapsed().as_millis() as u64,
            "Front end finished for {}",
            asset.display_name()
        );

        Ok(FrontEndOutput {
            report,
            audio,
            features,
        })
    }
}

/// A front end running on its own thread
struct FrontEndWorker {
    result: Receiver<Result<FrontEndOutput, AudioValidationError>>,
    stop_flag: Arc<AtomicBool>,
    #[cfg_attr(not(test), allow(dead_code))]
    handle: JoinHandle<()>,
}

/// Runs recordings through the full analysis chain.
///
/// Cheap to clone; clones share the classifier gateway.
#[derive(Clone)]
pub struct Pipeline {
    front_end: FrontEnd,
    gateway: Arc<ClassifierGateway>,
    budget: Option<Duration>,
}

impl Pipeline {
    pub fn new(config: &Config, gateway: Arc<ClassifierGateway>) -> Self {
        Self {
            front_end: FrontEnd {
                validator: AudioValidator::new(config),
                preprocessor: AudioPreprocessor::new(config.target_sample_rate, config.trim_top_db),
                extractor: Arc::new(FeatureExtractor::new()),
            },
            gateway,
            budget: config.analysis_budget(),
        }
    }

    /// Load the configured artifacts and build a ready pipeline
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let model_path = config
            .resolve_model_path()
            .map_err(|e| ArtifactError::Unresolved(format!("{:#}", e)))?;
        let scaler_path = config
            .resolve_scaler_path()
            .map_err(|e| ArtifactError::Unresolved(format!("{:#}", e)))?;

        let mut gateway = ClassifierGateway::new();
        gateway.load(&model_path, &scaler_path)?;
        Ok(Self::new(config, Arc::new(gateway)))
    }

    pub fn gateway(&self) -> &Arc<ClassifierGateway> {
        &self.gateway
    }

    /// Validate, preprocess and extract within the analysis budget
    pub fn run_front_end(&self, asset: &AudioAsset) -> Result<FrontEndOutput, PipelineError> {
        let Some(budget) = self.budget else {
            let never_stop = AtomicBool::new(false);
            return Ok(self.front_end.run(asset, &never_stop)?);
        };

        let worker = self.spawn_front_end(asset)?;
        match worker.result.recv_timeout(budget) {
            Ok(result) => Ok(result?),
            Err(RecvTimeoutError::Timeout) => {
                worker.stop_flag.store(true, Ordering::SeqCst);
                let budget_ms = budget.as_millis() as u64;
                warn!(
                    "Analysis of {} exceeded {}ms budget",
                    asset.display_name(),
                    budget_ms
                );
                Err(InferenceError::BudgetExceeded { budget_ms }.into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(InferenceError::Worker(
                "analysis worker exited without a result".to_string(),
            )
            .into()),
        }
    }

    /// Start the front end on its own thread. The worker abandons the
    /// analysis at its next frame once `stop_flag` is raised.
    fn spawn_front_end(&self, asset: &AudioAsset) -> Result<FrontEndWorker, InferenceError> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let front_end = self.front_end.clone();
        let worker_asset = asset.clone();
        let worker_stop = Arc::clone(&stop_flag);

        let handle = std::thread::Builder::new()
            .name("voice-analysis".to_string())
            .spawn(move || {
                let result = front_end.run(&worker_asset, &worker_stop);
                if matches!(result, Err(AudioValidationError::Cancelled)) {
                    debug!("Analysis of {} cancelled", worker_asset.display_name());
                }
                // The caller may have given up already
                let _ = tx.send(result);
            })
            .map_err(|e| InferenceError::Worker(e.to_string()))?;

        Ok(FrontEndWorker {
            result: rx,
            stop_flag,
            handle,
        })
    }

    /// Features only, without touching the classifier
    pub fn extract_features(&self, asset: &AudioAsset) -> Result<FeatureVector, PipelineError> {
        Ok(self.run_front_end(asset)?.features)
    }

    pub fn predict_from_audio(&self, path: &Path) -> Result<Assessment, PipelineError> {
        self.ensure_loaded()?;
        let output = self.run_front_end(&AudioAsset::from_path(path))?;
        let prediction = self.gateway.predict_features(&output.features)?;
        let result = derive(prediction, &output.features);

        Ok(Assessment {
            status: result.status(),
            health_score: result.health_score(),
            confidence: result.confidence(),
            risk_level: result.risk_level(),
            probability: result.probability(),
            predicted_class: result.predicted_class(),
            features: output.features,
            vocal_metrics: *result.vocal_metrics(),
        })
    }

    pub fn analyze(
        &self,
        asset: &AudioAsset,
        context: &RecordingContext,
    ) -> Result<AnalysisRecord, PipelineError> {
        self.ensure_loaded()?;
        let start = Instant::now();

        let output = self.run_front_end(asset)?;
        let record = self.score(&output, context)?;

        info!(
            "Analyzed {} in {}ms: {} (health {}, confidence {})",
            asset.display_name(),
            start.elapsed().as_millis(),
            record.overall_result.status,
            record.health_score,
            record.confidence
        );

        Ok(record)
    }

    /// Classify front-end output and assemble the record
    pub fn score(
        &self,
        output: &FrontEndOutput,
        context: &RecordingContext,
    ) -> Result<AnalysisRecord, PipelineError> {
        let prediction = self.gateway.predict_features(&output.features)?;
        let result = derive(prediction, &output.features);
        Ok(assemble(&output.report, &output.features, &result, context))
    }

    fn ensure_loaded(&self) -> Result<(), InferenceError> {
        if self.gateway.is_loaded() {
            Ok(())
        } else {
            Err(InferenceError::NotLoaded)
        }
    }
}
