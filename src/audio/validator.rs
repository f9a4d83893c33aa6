use std::sync::atomic::AtomicBool;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::decoder::{decode, DecodedAudio};
use super::{AudioAsset, AudioFormat, AudioSource, AudioValidationError};
use crate::config::Config;

/// Properties of an asset that passed every check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub size_bytes: u64,
    pub format: AudioFormat,
}

impl ValidationReport {
    pub fn file_size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Gatekeeper for uploaded recordings.
///
/// Checks run in a fixed order and the first failure wins:
/// existence, size, format, decodability, duration.
#[derive(Debug, Clone)]
pub struct AudioValidator {
    max_file_size_bytes: u64,
    max_file_size_mb: u32,
    allowed_formats: Vec<AudioFormat>,
    min_duration_secs: f64,
    max_duration_secs: f64,
}

impl AudioValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes(),
            max_file_size_mb: config.max_file_size_mb,
            allowed_formats: config.allowed_formats.clone(),
            min_duration_secs: config.min_duration_secs,
            max_duration_secs: config.max_duration_secs,
        }
    }

    pub fn validate(&self, asset: &AudioAsset) -> Result<ValidationReport, AudioValidationError> {
        self.validate_and_decode(asset, None).map(|(report, _)| report)
    }

    /// Validate and hand back the decoded audio so callers don't decode twice
    pub fn validate_and_decode(
        &self,
        asset: &AudioAsset,
        stop_flag: Option<&AtomicBool>,
    ) -> Result<(ValidationReport, DecodedAudio), AudioValidationError> {
        let size_bytes = self.check_size(asset)?;
        let format = self.check_format(asset)?;

        let decoded = decode(asset, stop_flag)?;
        let duration_secs = decoded.duration_secs();
        self.check_duration(duration_secs)?;

        let report = ValidationReport {
            duration_secs,
            sample_rate: decoded.sample_rate,
            channels: decoded.channels,
            size_bytes,
            format,
        };

        info!(
            "Validated {}: {} {:.1}s @ {} Hz, {:.2}MB",
            asset.display_name(),
            report.format,
            report.duration_secs,
            report.sample_rate,
            report.file_size_mb()
        );

        Ok((report, decoded))
    }

    fn check_size(&self, asset: &AudioAsset) -> Result<u64, AudioValidationError> {
        let size_bytes = match &asset.source {
            AudioSource::Path(path) => {
                if !path.exists() {
                    warn!("Audio file missing: {}", path.display());
                    return Err(AudioValidationError::NotFound(path.clone()));
                }
                std::fs::metadata(path)?.len()
            }
            AudioSource::Buffer { data, .. } => data.len() as u64,
        };

        if size_bytes == 0 {
            return Err(AudioValidationError::EmptyFile);
        }
        if size_bytes > self.max_file_size_bytes {
            return Err(AudioValidationError::TooLarge {
                size_bytes,
                max_mb: self.max_file_size_mb,
            });
        }

        debug!("Size check passed: {} bytes", size_bytes);
        Ok(size_bytes)
    }

    fn check_format(&self, asset: &AudioAsset) -> Result<AudioFormat, AudioValidationError> {
        match asset.detect_format() {
            Some(format) if self.allowed_formats.contains(&format) => Ok(format),
            _ => Err(AudioValidationError::UnsupportedFormat {
                found: asset.declared_format(),
                allowed: self
                    .allowed_formats
                    .iter()
                    .map(AudioFormat::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn check_duration(&self, duration_secs: f64) -> Result<(), AudioValidationError> {
        if duration_secs < self.min_duration_secs {
            return Err(AudioValidationError::TooShort {
                duration_secs,
                min_secs: self.min_duration_secs,
            });
        }
        if duration_secs > self.max_duration_secs {
            return Err(AudioValidationError::TooLong {
                duration_secs,
                max_secs: self.max_duration_secs,
            });
        }
        Ok(())
    }
}

impl Default for AudioValidator {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::io::Write;

    fn write_tone(path: &std::path::Path, sample_rate: u32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let n = (sample_rate as f32 * seconds) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            writer
                .write_sample(((2.0 * PI * 200.0 * t).sin() * 8000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_accepts_twenty_second_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        write_tone(&path, 16000, 20.0);

        let report = AudioValidator::default()
            .validate(&AudioAsset::from_path(&path))
            .unwrap();

        assert_eq!(report.format, AudioFormat::Wav);
        assert_eq!(report.sample_rate, 16000);
        assert_eq!(report.channels, 1);
        assert!((report.duration_secs - 20.0).abs() < 0.01);
        assert!(report.file_size_mb() > 0.5);
    }

    #[test]
    fn test_accepts_browser_ogg_opus_upload() {
        let bytes = crate::audio::opus_stream::test_support::ogg_opus_tone(180.0, 17.0);
        let asset = AudioAsset::from_bytes(bytes, None).with_content_type("audio/ogg;codecs=opus");

        let report = AudioValidator::default().validate(&asset).unwrap();

        assert_eq!(report.format, AudioFormat::Ogg);
        assert_eq!(report.sample_rate, 48_000);
        assert!((report.duration_secs - 17.0).abs() < 0.05, "{}", report.duration_secs);
    }

    #[test]
    fn test_missing_file() {
        let err = AudioValidator::default()
            .validate(&AudioAsset::from_path("/no/such/recording.wav"))
            .unwrap_err();
        assert!(matches!(err, AudioValidationError::NotFound(_)));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::File::create(&path).unwrap();

        let err = AudioValidator::default()
            .validate(&AudioAsset::from_path(&path))
            .unwrap_err();
        assert!(matches!(err, AudioValidationError::EmptyFile));
    }

    #[test]
    fn test_empty_buffer() {
        let err = AudioValidator::default()
            .validate(&AudioAsset::from_bytes(Vec::<u8>::new(), Some("a.wav".into())))
            .unwrap_err();
        assert!(matches!(err, AudioValidationError::EmptyFile));
    }

    #[test]
    fn test_too_large_checked_before_format() {
        let config = Config {
            max_file_size_mb: 1,
            ..Config::default()
        };
        let data = vec![0u8; 2 * 1024 * 1024];
        let err = AudioValidator::new(&config)
            .validate(&AudioAsset::from_bytes(data, Some("big.txt".into())))
            .unwrap_err();
        assert!(matches!(err, AudioValidationError::TooLarge { max_mb: 1, .. }));
    }

    #[test]
    fn test_text_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not audio at all").unwrap();

        let err = AudioValidator::default()
            .validate(&AudioAsset::from_path(&path))
            .unwrap_err();
        match err {
            AudioValidationError::UnsupportedFormat { found, allowed } => {
                assert_eq!(found, "txt");
                assert!(allowed.contains("wav"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disallowed_format_from_config() {
        let config = Config {
            allowed_formats: vec![AudioFormat::Wav],
            ..Config::default()
        };
        let asset = AudioAsset::from_bytes(vec![1u8; 128], Some("clip.mp3".into()));
        let err = AudioValidator::new(&config).validate(&asset).unwrap_err();
        assert!(matches!(err, AudioValidationError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_garbage_wav_is_corrupt() {
        let asset = AudioAsset::from_bytes(vec![7u8; 4096], Some("broken.wav".into()));
        let err = AudioValidator::default().validate(&asset).unwrap_err();
        assert!(matches!(err, AudioValidationError::CorruptAudio(_)));
    }

    #[test]
    fn test_too_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_tone(&path, 8000, 5.0);

        let err = AudioValidator::default()
            .validate(&AudioAsset::from_path(&path))
            .unwrap_err();
        assert!(matches!(err, AudioValidationError::TooShort { .. }));
    }

    #[test]
    fn test_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_tone(&path, 8000, 70.0);

        let err = AudioValidator::default()
            .validate(&AudioAsset::from_path(&path))
            .unwrap_err();
        match err {
            AudioValidationError::TooLong { duration_secs, max_secs } => {
                assert!((duration_secs - 70.0).abs() < 0.01);
                assert_eq!(max_secs, 60.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_and_decode_returns_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        write_tone(&path, 8000, 16.0);

        let (report, decoded) = AudioValidator::default()
            .validate_and_decode(&AudioAsset::from_path(&path), None)
            .unwrap();
        assert_eq!(decoded.samples.len(), 8000 * 16);
        assert_eq!(report.sample_rate, decoded.sample_rate);
    }
}
