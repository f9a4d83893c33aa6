//! # Acoustic Features
//!
//! Fixed set of 39 scalar descriptors computed from a preprocessed recording.
//! The order of [`FEATURE_NAMES`] is the order classifiers are trained on;
//! changing it requires bumping [`FEATURE_SCHEMA_VERSION`] and retraining.
//!
//! | Group | Features |
//! |-------|----------|
//! | MFCC | `mfcc_{1..13}_mean`, `mfcc_{1..13}_std` |
//! | Pitch | `pitch_mean`, `pitch_std`, `pitch_min`, `pitch_max` |
//! | Perturbation | `jitter`, `shimmer` |
//! | Spectral | `spectral_centroid_mean`, `spectral_centroid_std` |
//! | Temporal | `zcr_mean`, `zcr_std` |
//! | Energy | `rms_mean`, `rms_std` |
//! | Voice quality | `hnr` |

pub mod extractor;
pub mod frames;
pub mod mfcc;
pub mod pitch;
pub mod spectral;

pub use extractor::FeatureExtractor;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Version of the feature ordering below
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Number of features in a [`FeatureVector`]
pub const FEATURE_COUNT: usize = 39;

/// Canonical feature ordering
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mfcc_1_mean",
    "mfcc_2_mean",
    "mfcc_3_mean",
    "mfcc_4_mean",
    "mfcc_5_mean",
    "mfcc_6_mean",
    "mfcc_7_mean",
    "mfcc_8_mean",
    "mfcc_9_mean",
    "mfcc_10_mean",
    "mfcc_11_mean",
    "mfcc_12_mean",
    "mfcc_13_mean",
    "mfcc_1_std",
    "mfcc_2_std",
    "mfcc_3_std",
    "mfcc_4_std",
    "mfcc_5_std",
    "mfcc_6_std",
    "mfcc_7_std",
    "mfcc_8_std",
    "mfcc_9_std",
    "mfcc_10_std",
    "mfcc_11_std",
    "mfcc_12_std",
    "mfcc_13_std",
    "pitch_mean",
    "pitch_std",
    "pitch_min",
    "pitch_max",
    "jitter",
    "shimmer",
    "spectral_centroid_mean",
    "spectral_centroid_std",
    "zcr_mean",
    "zcr_std",
    "rms_mean",
    "rms_std",
    "hnr",
];

/// Position of a feature in [`FEATURE_NAMES`]
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// 39 named scalars in canonical order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// Lookup that treats unknown names as 0.0
    pub fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    /// Set a named feature; returns false for an unknown name
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match feature_index(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }

    /// Feature values grouped for presentation
    pub fn display_groups(&self) -> DisplayFeatures {
        DisplayFeatures {
            pitch: PitchDisplay {
                mean: self.value("pitch_mean"),
                std: self.value("pitch_std"),
                min: self.value("pitch_min"),
                max: self.value("pitch_max"),
            },
            voice_quality: VoiceQualityDisplay {
                jitter: self.value("jitter"),
                shimmer: self.value("shimmer"),
                hnr: self.value("hnr"),
            },
            spectral: SpectralDisplay {
                centroid_mean: self.value("spectral_centroid_mean"),
                centroid_std: self.value("spectral_centroid_std"),
            },
            energy: EnergyDisplay {
                rms_mean: self.value("rms_mean"),
                rms_std: self.value("rms_std"),
            },
            temporal: TemporalDisplay {
                zcr_mean: self.value("zcr_mean"),
                zcr_std: self.value("zcr_std"),
            },
        }
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Canonical classifier input
pub fn to_ordered_array(features: &FeatureVector) -> Vec<f64> {
    features.values.to_vec()
}

// Serialized as an object whose keys keep canonical order
impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisplayFeatures {
    pub pitch: PitchDisplay,
    pub voice_quality: VoiceQualityDisplay,
    pub spectral: SpectralDisplay,
    pub energy: EnergyDisplay,
    pub temporal: TemporalDisplay,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PitchDisplay {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceQualityDisplay {
    pub jitter: f64,
    pub shimmer: f64,
    pub hnr: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpectralDisplay {
    pub centroid_mean: f64,
    pub centroid_std: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnergyDisplay {
    pub rms_mean: f64,
    pub rms_std: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TemporalDisplay {
    pub zcr_mean: f64,
    pub zcr_std: f64,
}

/// Population mean and standard deviation; `(0, 0)` for an empty slice
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Mean absolute difference between consecutive values; 0.0 with fewer than two
pub(crate) fn mean_abs_diff(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_feature_names_unique_and_complete() {
        let unique: HashSet<_> = FEATURE_NAMES.iter().collect();
        assert_eq!(unique.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_NAMES[0], "mfcc_1_mean");
        assert_eq!(FEATURE_NAMES[13], "mfcc_1_std");
        assert_eq!(FEATURE_NAMES[26], "pitch_mean");
        assert_eq!(FEATURE_NAMES[FEATURE_COUNT - 1], "hnr");
    }

    #[test]
    fn test_set_and_get() {
        let mut fv = FeatureVector::zeros();
        assert!(fv.set("jitter", 1.5));
        assert!(!fv.set("not_a_feature", 1.0));
        assert_eq!(fv.get("jitter"), Some(1.5));
        assert_eq!(fv.get("nope"), None);
        assert_eq!(to_ordered_array(&fv)[30], 1.5);
    }

    #[test]
    fn test_serializes_in_canonical_order() {
        let mut fv = FeatureVector::zeros();
        fv.set("hnr", 12.0);
        let json = serde_json::to_string(&fv).unwrap();

        let mfcc_pos = json.find("\"mfcc_1_mean\"").unwrap();
        let pitch_pos = json.find("\"pitch_mean\"").unwrap();
        let hnr_pos = json.find("\"hnr\"").unwrap();
        assert!(mfcc_pos < pitch_pos && pitch_pos < hnr_pos);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), FEATURE_COUNT);
        assert_eq!(parsed["hnr"], 12.0);
    }

    #[test]
    fn test_display_groups() {
        let mut fv = FeatureVector::zeros();
        fv.set("pitch_max", 300.0);
        fv.set("zcr_std", 0.02);
        let groups = fv.display_groups();
        assert_eq!(groups.pitch.max, 300.0);
        assert_eq!(groups.temporal.zcr_std, 0.02);

        let json = serde_json::to_value(&groups).unwrap();
        assert!(json.get("voice_quality").is_some());
    }

    #[test]
    fn test_mean_std_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_mean_abs_diff() {
        assert_eq!(mean_abs_diff(&[1.0]), 0.0);
        assert!((mean_abs_diff(&[1.0, 3.0, 2.0]) - 1.5).abs() < 1e-12);
    }
}
