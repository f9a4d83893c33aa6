//! Audio intake: validation, decoding, resampling and preprocessing.
//!
//! Every failure in this module is reported through [`AudioValidationError`],
//! including decode failures discovered late during preprocessing.

pub mod decoder;
pub mod opus_stream;
pub mod preprocess;
pub mod resampler;
pub mod validator;

pub use decoder::{decode, DecodedAudio};
pub use preprocess::{write_wav, AudioPreprocessor, PreprocessedAudio};
pub use resampler::{resample, resample_until};
pub use validator::{AudioValidator, ValidationReport};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while validating or decoding an audio asset
#[derive(Debug, Error)]
pub enum AudioValidationError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Audio file is empty")]
    EmptyFile,

    #[error("File too large: {:.2}MB (max: {max_mb}MB)", bytes_to_mb(.size_bytes))]
    TooLarge { size_bytes: u64, max_mb: u32 },

    #[error("Unsupported format: {found}. Allowed: {allowed}")]
    UnsupportedFormat { found: String, allowed: String },

    #[error("Error reading audio file: {0}")]
    CorruptAudio(String),

    #[error("Audio too short: {duration_secs:.1}s (min: {min_secs}s)")]
    TooShort { duration_secs: f64, min_secs: f64 },

    #[error("Audio too long: {duration_secs:.1}s (max: {max_secs}s)")]
    TooLong { duration_secs: f64, max_secs: f64 },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// True once the owner of `stop_flag` has asked the analysis to stop
pub(crate) fn stop_requested(stop_flag: Option<&AtomicBool>) -> bool {
    stop_flag.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

fn bytes_to_mb(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

/// Container formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Webm,
    Mp3,
    Ogg,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Webm => "webm",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    /// Map a declared MIME type to a format, ignoring parameters such as `codecs=`
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match essence.as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Some(Self::Wav),
            "audio/webm" | "video/webm" => Some(Self::Webm),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/ogg" | "application/ogg" => Some(Self::Ogg),
            _ => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "wave" => Ok(Self::Wav),
            "webm" => Ok(Self::Webm),
            "mp3" => Ok(Self::Mp3),
            "ogg" | "oga" => Ok(Self::Ogg),
            _ => Err(format!("Unknown audio format: {}", s)),
        }
    }
}

/// Where the bytes of an asset live
#[derive(Debug, Clone)]
pub enum AudioSource {
    Path(PathBuf),
    /// An uploaded buffer; `file_name` supplies the extension if known
    Buffer {
        data: Arc<[u8]>,
        file_name: Option<String>,
    },
}

/// A recording submitted for analysis
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub source: AudioSource,
    pub content_type: Option<String>,
}

impl AudioAsset {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AudioSource::Path(path.into()),
            content_type: None,
        }
    }

    pub fn from_bytes(data: impl Into<Arc<[u8]>>, file_name: Option<String>) -> Self {
        Self {
            source: AudioSource::Buffer {
                data: data.into(),
                file_name,
            },
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Lowercased file extension, if the asset has a name
    pub fn extension(&self) -> Option<String> {
        let name: &Path = match &self.source {
            AudioSource::Path(path) => path.as_path(),
            AudioSource::Buffer {
                file_name: Some(name),
                ..
            } => Path::new(name.as_str()),
            AudioSource::Buffer { file_name: None, .. } => return None,
        };
        name.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Human-readable label for logs
    pub fn display_name(&self) -> String {
        match &self.source {
            AudioSource::Path(path) => path.display().to_string(),
            AudioSource::Buffer {
                file_name: Some(name),
                ..
            } => name.clone(),
            AudioSource::Buffer { file_name: None, data } => format!("<buffer {} bytes>", data.len()),
        }
    }

    /// Resolve the asset's format. An extension, when present, is authoritative;
    /// the declared content type is only consulted for nameless assets.
    pub fn detect_format(&self) -> Option<AudioFormat> {
        match self.extension() {
            Some(ext) => AudioFormat::from_extension(&ext),
            None => self
                .content_type
                .as_deref()
                .and_then(AudioFormat::from_content_type),
        }
    }

    /// The raw format tag as declared, for error reporting
    pub fn declared_format(&self) -> String {
        self.extension()
            .or_else(|| self.content_type.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
