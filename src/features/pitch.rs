//! Fundamental frequency tracking with the McLeod pitch method.
//!
//! ## Algorithm
//! 1. Slide an uncentered window across the buffer
//! 2. Use McLeod algorithm to find F0 per frame
//! 3. Keep frames inside the human vocal range (50Hz - 500Hz)
//! 4. Summarize the voiced track; jitter is the mean absolute step between
//!    consecutive voiced frames

use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;
use std::sync::atomic::AtomicBool;

use super::frames::{FRAME_LENGTH, HOP_LENGTH};
use super::{mean_abs_diff, mean_std};
use crate::audio::stop_requested;

/// Minimum pitch in Hz (human vocal range)
const MIN_PITCH: f32 = 50.0;

/// Maximum pitch in Hz (human vocal range)
const MAX_PITCH: f32 = 500.0;

/// Power threshold for pitch detection
const POWER_THRESHOLD: f32 = 0.8;

/// Clarity threshold for pitch detection
const CLARITY_THRESHOLD: f32 = 0.5;

/// Summary of the voiced pitch track; all zeros when nothing is voiced
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub jitter: f64,
    pub voiced_frames: usize,
}

/// Per-frame F0 of every voiced frame, in time order
pub fn track_pitch(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    track_pitch_until(samples, sample_rate, None).unwrap_or_default()
}

/// [`track_pitch`] checking `stop_flag` once per frame; `None` if it was raised
pub fn track_pitch_until(
    samples: &[f32],
    sample_rate: u32,
    stop_flag: Option<&AtomicBool>,
) -> Option<Vec<f64>> {
    if samples.len() < FRAME_LENGTH || sample_rate == 0 {
        return Some(Vec::new());
    }

    let mut detector = McLeodDetector::new(FRAME_LENGTH, FRAME_LENGTH / 2);
    let mut pitches = Vec::new();

    let mut start = 0;
    while start + FRAME_LENGTH <= samples.len() {
        if stop_requested(stop_flag) {
            return None;
        }
        let frame = &samples[start..start + FRAME_LENGTH];

        if let Some(pitch) =
            detector.get_pitch(frame, sample_rate as usize, POWER_THRESHOLD, CLARITY_THRESHOLD)
        {
            if pitch.frequency.is_finite()
                && pitch.frequency >= MIN_PITCH
                && pitch.frequency <= MAX_PITCH
            {
                pitches.push(pitch.frequency as f64);
            }
        }

        start += HOP_LENGTH;
    }

    Some(pitches)
}

pub fn pitch_stats(samples: &[f32], sample_rate: u32) -> PitchStats {
    pitch_stats_until(samples, sample_rate, None).unwrap_or_default()
}

/// [`pitch_stats`] that gives up once `stop_flag` is raised
pub fn pitch_stats_until(
    samples: &[f32],
    sample_rate: u32,
    stop_flag: Option<&AtomicBool>,
) -> Option<PitchStats> {
    let pitches = track_pitch_until(samples, sample_rate, stop_flag)?;
    if pitches.is_empty() {
        return Some(PitchStats::default());
    }

    let (mean, std) = mean_std(&pitches);
    let min = pitches.iter().copied().fold(f64::INFINITY, f64::min);
    let max = pitches.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(PitchStats {
        mean,
        std,
        min,
        max,
        jitter: mean_abs_diff(&pitches),
        voiced_frames: pitches.len(),
    })
}
