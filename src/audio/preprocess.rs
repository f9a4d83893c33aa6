//! # Audio Preprocessing
//!
//! Turns a validated asset into the fixed-rate mono buffer that feature
//! extraction expects. The chain is fixed and never branches on content:
//!
//! 1. **Decode** - container/codec decode and downmix to mono
//! 2. **Resample** - to the configured target rate
//! 3. **Peak normalize** - loudest sample becomes ±1.0
//! 4. **Trim** - drop leading/trailing frames quieter than `top_db` below the loudest frame

use std::path::Path;
use std::sync::atomic::AtomicBool;

use tracing::{debug, info};

use super::decoder::{decode, DecodedAudio};
use super::resampler::resample_until;
use super::{AudioAsset, AudioValidationError};
use crate::features::frames::FrameLayout;

/// Fixed-rate mono samples ready for feature extraction
#[derive(Debug, Clone)]
pub struct PreprocessedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PreprocessedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode → resample → normalize → trim
#[derive(Debug, Clone)]
pub struct AudioPreprocessor {
    target_sample_rate: u32,
    trim_top_db: f32,
    layout: FrameLayout,
}

impl AudioPreprocessor {
    /// Default target rate for speech features
    pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

    /// Default silence threshold below the loudest frame
    pub const DEFAULT_TOP_DB: f32 = 20.0;

    pub fn new(target_sample_rate: u32, trim_top_db: f32) -> Self {
        Self {
            target_sample_rate,
            trim_top_db,
            layout: FrameLayout::default(),
        }
    }

    /// Decode the asset and run the full chain
    pub fn preprocess(
        &self,
        asset: &AudioAsset,
        stop_flag: Option<&AtomicBool>,
    ) -> Result<PreprocessedAudio, AudioValidationError> {
        let decoded = decode(asset, stop_flag)?;
        self.process_decoded(decoded, stop_flag)
    }

    /// Run the chain on audio that has already been decoded.
    ///
    /// `stop_flag` is checked between resampler chunks.
    pub fn process_decoded(
        &self,
        decoded: DecodedAudio,
        stop_flag: Option<&AtomicBool>,
    ) -> Result<PreprocessedAudio, AudioValidationError> {
        let native_rate = decoded.sample_rate;
        let mut samples = resample_until(
            &decoded.samples,
            native_rate,
            self.target_sample_rate,
            stop_flag,
        )?;

        peak_normalize(&mut samples);
        let before_trim = samples.len();
        let samples = self.trim_silence(samples);

        info!(
            "Preprocessed audio: {} Hz -> {} Hz, {} samples ({} trimmed)",
            native_rate,
            self.target_sample_rate,
            samples.len(),
            before_trim - samples.len()
        );

        Ok(PreprocessedAudio {
            samples,
            sample_rate: self.target_sample_rate,
        })
    }

    /// Remove leading and trailing frames whose energy is more than `top_db`
    /// below the loudest frame. A buffer with no frame above the threshold
    /// (e.g. digital silence) is returned unchanged.
    pub fn trim_silence(&self, samples: Vec<f32>) -> Vec<f32> {
        let rms = self.layout.frame_rms(&samples);
        let max_power = rms.iter().fold(0.0f32, |m, r| m.max(r * r));
        if max_power <= 0.0 {
            return samples;
        }

        let threshold_db = -self.trim_top_db;
        let is_loud = |r: &f32| {
            let power = (r * r).max(1e-10);
            10.0 * (power / max_power).log10() > threshold_db
        };

        let first = rms.iter().position(is_loud);
        let last = rms.iter().rposition(is_loud);
        let (Some(first), Some(last)) = (first, last) else {
            return samples;
        };

        let hop = self.layout.hop_length;
        let start = (first * hop).min(samples.len());
        let end = ((last + 1) * hop).min(samples.len());
        debug!("Trimming silence: keeping samples {}..{}", start, end);

        samples[start..end].to_vec()
    }
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SAMPLE_RATE, Self::DEFAULT_TOP_DB)
    }
}

/// Scale so the largest absolute sample is 1.0; silent buffers are left as-is
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 && peak.is_finite() {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Write mono samples as 16-bit PCM WAV
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}
