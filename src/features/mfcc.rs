//! Mel-frequency cepstral coefficients.
//!
//! Power spectrum → triangular mel filterbank → dB with a fixed dynamic
//! range → orthonormal DCT-II, keeping the lowest coefficients.

use super::spectral::AMIN;

/// Number of mel bands
pub const N_MELS: usize = 128;

/// Number of cepstral coefficients kept
pub const N_MFCC: usize = 13;

/// Dynamic range kept below the loudest mel bin, in dB
pub const TOP_DB: f32 = 80.0;

/// Convert frequency to mel scale
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to frequency
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// One triangular filter, stored from its first non-zero bin
#[derive(Debug, Clone)]
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

/// Triangular filters evenly spaced on the mel scale between 0 Hz and Nyquist
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
    n_bins: usize,
}

impl MelFilterbank {
    pub fn new(n_mels: usize, n_bins: usize, sample_rate: u32) -> Self {
        let fmax = sample_rate as f32 / 2.0;
        let mel_max = hz_to_mel(fmax);

        // n_mels + 2 equally spaced points in mel, mapped to fractional bins
        let bin_points: Vec<f32> = (0..=n_mels + 1)
            .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
            .map(|hz| (n_bins as f32 - 1.0) * hz / fmax)
            .collect();

        let filters = (0..n_mels)
            .map(|i| {
                let (left, center, right) = (bin_points[i], bin_points[i + 1], bin_points[i + 2]);
                let dense: Vec<f32> = (0..n_bins)
                    .map(|bin| {
                        let b = bin as f32;
                        if b >= left && b < center {
                            (b - left) / (center - left)
                        } else if b >= center && b <= right {
                            (right - b) / (right - center)
                        } else {
                            0.0
                        }
                    })
                    .collect();

                let start = dense.iter().position(|w| *w > 0.0).unwrap_or(0);
                let end = dense.iter().rposition(|w| *w > 0.0).map_or(start, |e| e + 1);
                MelFilter {
                    start,
                    weights: dense[start..end].to_vec(),
                }
            })
            .collect();

        Self { filters, n_bins }
    }

    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Mel band energies of one power spectrum
    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        debug_assert_eq!(power.len(), self.n_bins);
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .weights
                    .iter()
                    .zip(power.iter().skip(filter.start))
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }
}

/// Orthonormal DCT-II basis, `n_out` rows of length `n_in`
fn dct_matrix(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| {
                    let angle = std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n);
                    (scale * angle.cos()) as f32
                })
                .collect()
        })
        .collect()
}

/// Accumulates log-mel frames and turns them into MFCC trajectories
pub struct MfccComputer {
    filterbank: MelFilterbank,
    dct: Vec<Vec<f32>>,
    log_mel: Vec<Vec<f32>>,
}

impl MfccComputer {
    pub fn new(n_bins: usize, sample_rate: u32) -> Self {
        Self {
            filterbank: MelFilterbank::new(N_MELS, n_bins, sample_rate),
            dct: dct_matrix(N_MFCC, N_MELS),
            log_mel: Vec::new(),
        }
    }

    /// Add one frame given its magnitude spectrum
    pub fn push_magnitude(&mut self, magnitude: &[f32]) {
        let power: Vec<f32> = magnitude.iter().map(|m| m * m).collect();
        let mel = self.filterbank.apply(&power);
        self.log_mel
            .push(mel.into_iter().map(|e| 10.0 * e.max(AMIN).log10()).collect());
    }

    pub fn frame_count(&self) -> usize {
        self.log_mel.len()
    }

    /// Clip to `TOP_DB` below the global peak and project onto the DCT basis.
    ///
    /// Returns one `Vec` per coefficient holding its value in every frame.
    pub fn finish(self) -> Vec<Vec<f32>> {
        let peak = self
            .log_mel
            .iter()
            .flat_map(|frame| frame.iter().copied())
            .fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - TOP_DB;

        let mut trajectories = vec![Vec::with_capacity(self.log_mel.len()); self.dct.len()];
        for frame in &self.log_mel {
            for (coef, basis) in trajectories.iter_mut().zip(self.dct.iter()) {
                let value: f32 = frame
                    .iter()
                    .zip(basis.iter())
                    .map(|(db, b)| db.max(floor) * b)
                    .sum();
                coef.push(value);
            }
        }
        trajectories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hz_to_mel() {
        assert!((hz_to_mel(0.0) - 0.0).abs() < 1e-6);
        assert!((hz_to_mel(1000.0) - 1000.0).abs() < 50.0);
    }

    #[test]
    fn test_mel_to_hz_roundtrip() {
        for hz in [100.0, 500.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-2, "Roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_filterbank_shape() {
        let fb = MelFilterbank::new(N_MELS, 1025, 22050);
        assert_eq!(fb.n_mels(), N_MELS);
        for filter in &fb.filters {
            assert!(filter.weights.iter().all(|w| *w >= 0.0));
            assert!(filter.start + filter.weights.len() <= 1025);
        }
        let out = fb.apply(&vec![1.0; 1025]);
        assert_eq!(out.len(), N_MELS);
    }

    #[test]
    fn test_dct_is_orthonormal() {
        let dct = dct_matrix(N_MFCC, N_MELS);
        for a in 0..N_MFCC {
            for b in 0..N_MFCC {
                let dot: f32 = dct[a].iter().zip(dct[b].iter()).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4, "rows {a},{b}: {dot}");
            }
        }
    }

    #[test]
    fn test_constant_log_mel_only_has_dc() {
        let mut mfcc = MfccComputer::new(1025, 22050);
        for _ in 0..4 {
            mfcc.push_magnitude(&vec![0.0; 1025]);
        }
        let coeffs = mfcc.finish();
        assert_eq!(coeffs.len(), N_MFCC);
        assert!(coeffs[0][0] < 0.0);
        for c in &coeffs[1..] {
            assert!(c.iter().all(|v| v.abs() < 1e-2));
        }
    }
}
