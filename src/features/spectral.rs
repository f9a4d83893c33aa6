//! Short-time Fourier analysis and per-frame spectral descriptors.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

use super::frames::FrameLayout;
use crate::audio::stop_requested;

/// Floor applied to power values before taking logarithms
pub const AMIN: f32 = 1e-10;

/// Hann-windowed STFT over centered frames
pub struct StftAnalyzer {
    layout: FrameLayout,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl StftAnalyzer {
    pub fn new(layout: FrameLayout) -> Self {
        let n = layout.frame_length;
        // Periodic Hann, matching common STFT conventions
        let window: Vec<f32> = (0..n)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        Self { layout, fft, window }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Number of frequency bins per spectrum
    pub fn n_bins(&self) -> usize {
        self.layout.frame_length / 2 + 1
    }

    /// Call `f` with the magnitude spectrum of every frame.
    ///
    /// Returns `false` if `stop_flag` was raised before the last frame.
    pub fn for_each_magnitude(
        &self,
        samples: &[f32],
        stop_flag: Option<&AtomicBool>,
        mut f: impl FnMut(&[f32]),
    ) -> bool {
        let mut input = self.fft.make_input_vec();
        let mut output: Vec<Complex<f32>> = self.fft.make_output_vec();
        let mut magnitude = vec![0.0f32; self.n_bins()];

        for t in 0..self.layout.frame_count(samples.len()) {
            if stop_requested(stop_flag) {
                return false;
            }
            self.layout.fill_frame(samples, t, &mut input);
            for (x, w) in input.iter_mut().zip(self.window.iter()) {
                *x *= w;
            }

            if let Err(e) = self.fft.process(&mut input, &mut output) {
                warn!("FFT failed on frame {}: {}", t, e);
                return true;
            }

            for (m, c) in magnitude.iter_mut().zip(output.iter()) {
                *m = c.norm();
            }
            f(&magnitude);
        }
        true
    }
}

/// Center frequency in Hz of each bin
pub fn bin_frequencies(n_bins: usize, n_fft: usize, sample_rate: u32) -> Vec<f32> {
    (0..n_bins)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Magnitude-weighted mean frequency; 0.0 for an all-zero spectrum
pub fn spectral_centroid(magnitude: &[f32], freqs: &[f32]) -> f32 {
    let total: f32 = magnitude.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    magnitude
        .iter()
        .zip(freqs.iter())
        .map(|(m, f)| m * f)
        .sum::<f32>()
        / total
}

/// Geometric over arithmetic mean of the power spectrum.
///
/// Near 1.0 for noise-like frames, near 0.0 for tonal ones. A silent frame
/// is floored to `AMIN` everywhere and reports 1.0.
pub fn spectral_flatness(magnitude: &[f32]) -> f32 {
    if magnitude.is_empty() {
        return 0.0;
    }
    let n = magnitude.len() as f64;
    let (log_sum, sum) = magnitude.iter().fold((0.0f64, 0.0f64), |(ls, s), m| {
        let power = ((m * m).max(AMIN)) as f64;
        (ls + power.ln(), s + power)
    });
    let gmean = (log_sum / n).exp();
    let amean = sum / n;
    (gmean / amean) as f32
}
