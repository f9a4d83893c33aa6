use std::sync::atomic::AtomicBool;
use tracing::debug;

use super::frames::FrameLayout;
use super::mfcc::{MfccComputer, N_MFCC};
use super::pitch::pitch_stats_until;
use super::spectral::{bin_frequencies, spectral_centroid, spectral_flatness, StftAnalyzer};
use super::{mean_abs_diff, mean_std, FeatureVector};

/// Computes the full [`FeatureVector`] for a mono buffer.
///
/// Never fails: an empty buffer yields all zeros, and every value is finite.
pub struct FeatureExtractor {
    layout: FrameLayout,
    stft: StftAnalyzer,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let layout = FrameLayout::default();
        Self {
            layout,
            stft: StftAnalyzer::new(layout),
        }
    }

    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> FeatureVector {
        self.run(samples, sample_rate, None)
            .unwrap_or_else(FeatureVector::zeros)
    }

    /// [`extract`](Self::extract) that gives up once `stop_flag` is raised.
    ///
    /// The flag is checked once per STFT frame and once per pitch frame;
    /// `None` means the extraction was abandoned.
    pub fn extract_until(
        &self,
        samples: &[f32],
        sample_rate: u32,
        stop_flag: &AtomicBool,
    ) -> Option<FeatureVector> {
        self.run(samples, sample_rate, Some(stop_flag))
    }

    fn run(
        &self,
        samples: &[f32],
        sample_rate: u32,
        stop_flag: Option<&AtomicBool>,
    ) -> Option<FeatureVector> {
        let mut features = FeatureVector::zeros();
        if samples.is_empty() || sample_rate == 0 {
            return Some(features);
        }

        // Spectral pass: MFCC, centroid and flatness share one STFT
        let freqs = bin_frequencies(self.stft.n_bins(), self.layout.frame_length, sample_rate);
        let mut mfcc = MfccComputer::new(self.stft.n_bins(), sample_rate);
        let mut centroids = Vec::new();
        let mut flatness = Vec::new();
        let completed = self.stft.for_each_magnitude(samples, stop_flag, |magnitude| {
            mfcc.push_magnitude(magnitude);
            centroids.push(spectral_centroid(magnitude, &freqs) as f64);
            flatness.push(spectral_flatness(magnitude) as f64);
        });
        if !completed {
            return None;
        }

        let frames = mfcc.frame_count();
        for (i, trajectory) in mfcc.finish().iter().enumerate().take(N_MFCC) {
            let values: Vec<f64> = trajectory.iter().map(|v| *v as f64).collect();
            let (mean, std) = mean_std(&values);
            features.set(&format!("mfcc_{}_mean", i + 1), mean);
            features.set(&format!("mfcc_{}_std", i + 1), std);
        }

        let pitch = pitch_stats_until(samples, sample_rate, stop_flag)?;
        features.set("pitch_mean", pitch.mean);
        features.set("pitch_std", pitch.std);
        features.set("pitch_min", pitch.min);
        features.set("pitch_max", pitch.max);
        features.set("jitter", pitch.jitter);

        let rms: Vec<f64> = self
            .layout
            .frame_rms(samples)
            .into_iter()
            .map(f64::from)
            .collect();
        features.set("shimmer", mean_abs_diff(&rms));
        let (rms_mean, rms_std) = mean_std(&rms);
        features.set("rms_mean", rms_mean);
        features.set("rms_std", rms_std);

        let (centroid_mean, centroid_std) = mean_std(&centroids);
        features.set("spectral_centroid_mean", centroid_mean);
        features.set("spectral_centroid_std", centroid_std);

        let zcr: Vec<f64> = self
            .layout
            .frame_zcr(samples)
            .into_iter()
            .map(f64::from)
            .collect();
        let (zcr_mean, zcr_std) = mean_std(&zcr);
        features.set("zcr_mean", zcr_mean);
        features.set("zcr_std", zcr_std);

        if !flatness.is_empty() {
            let (mean_flatness, _) = mean_std(&flatness);
            features.set("hnr", -10.0 * (mean_flatness + 1e-10).log10());
        }

        sanitize(&mut features);

        debug!(
            frames,
            voiced_frames = pitch.voiced_frames,
            "Extracted features from {} samples",
            samples.len()
        );

        Some(features)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace any non-finite value with 0.0
fn sanitize(features: &mut FeatureVector) {
    let names: Vec<&'static str> = features
        .iter()
        .filter(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
        .collect();
    for name in names {
        features.set(name, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{to_ordered_array, FEATURE_COUNT};
    use proptest::prelude::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, rate: u32, seconds: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.8)
            .collect()
    }

    #[test]
    fn test_empty_buffer_is_all_zeros() {
        let fv = FeatureExtractor::new().extract(&[], 22050);
        let values = to_ordered_array(&fv);
        assert_eq!(values.len(), FEATURE_COUNT);
        assert!(values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_silence_has_no_pitch_and_finite_values() {
        let fv = FeatureExtractor::new().extract(&vec![0.0; 22050], 22050);
        let values = to_ordered_array(&fv);

        assert_eq!(values.len(), FEATURE_COUNT);
        assert!(values.iter().all(|v| v.is_finite()));
        for name in ["pitch_mean", "pitch_std", "pitch_min", "pitch_max", "jitter"] {
            assert_eq!(fv.get(name), Some(0.0), "{name}");
        }
        assert_eq!(fv.get("rms_mean"), Some(0.0));
        assert_eq!(fv.get("zcr_mean"), Some(0.0));
        assert!(fv.value("mfcc_2_std").abs() < 1e-6);
    }

    #[test]
    fn test_sine_features() {
        let fv = FeatureExtractor::new().extract(&sine(220.0, 22050, 2.0), 22050);

        let pitch = fv.value("pitch_mean");
        assert!((pitch - 220.0).abs() < 10.0, "pitch_mean {}", pitch);

        let centroid = fv.value("spectral_centroid_mean");
        assert!(centroid > 100.0 && centroid < 1000.0, "centroid {}", centroid);

        // Pure tone: low spectral flatness, hence a high HNR estimate
        assert!(fv.value("hnr") > 10.0, "hnr {}", fv.value("hnr"));
        assert!(fv.value("rms_mean") > 0.3);
        assert!(fv.value("zcr_mean") > 0.0);
    }

    #[test]
    fn test_louder_signal_has_larger_rms() {
        let extractor = FeatureExtractor::new();
        let quiet: Vec<f32> = sine(300.0, 22050, 1.0).iter().map(|s| s * 0.1).collect();
        let loud = sine(300.0, 22050, 1.0);

        assert!(
            extractor.extract(&loud, 22050).value("rms_mean")
                > extractor.extract(&quiet, 22050).value("rms_mean")
        );
    }

    #[test]
    fn test_extract_until_finishes_without_stop() {
        let extractor = FeatureExtractor::new();
        let samples = sine(220.0, 22050, 1.0);
        let flag = AtomicBool::new(false);

        let fv = extractor.extract_until(&samples, 22050, &flag).unwrap();
        assert_eq!(fv, extractor.extract(&samples, 22050));
    }

    #[test]
    fn test_extract_until_stops_promptly() {
        use std::sync::atomic::Ordering;
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        // Long enough that a full extraction takes well over the stop delay
        let samples = sine(220.0, 22050, 120.0);
        let flag = Arc::new(AtomicBool::new(false));

        let worker_flag = Arc::clone(&flag);
        let worker = std::thread::spawn(move || {
            FeatureExtractor::new().extract_until(&samples, 22050, &worker_flag)
        });

        std::thread::sleep(Duration::from_millis(20));
        let raised = Instant::now();
        flag.store(true, Ordering::SeqCst);
        let result = worker.join().unwrap();

        assert!(result.is_none());
        assert!(
            raised.elapsed() < Duration::from_secs(1),
            "extraction ran {:?} past the stop",
            raised.elapsed()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_always_39_finite_values(
            samples in proptest::collection::vec(-1.0f32..1.0, 0..6000)
        ) {
            let fv = FeatureExtractor::new().extract(&samples, 22050);
            let values = to_ordered_array(&fv);
            prop_assert_eq!(values.len(), FEATURE_COUNT);
            prop_assert!(values.iter().all(|v| v.is_finite()));
        }
    }
}
