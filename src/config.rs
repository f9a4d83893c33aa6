use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::audio::AudioFormat;

/// Default classifier artifact file name inside the models directory
pub const DEFAULT_MODEL_FILE: &str = "voice_model.json";

/// Default scaler artifact file name inside the models directory
pub const DEFAULT_SCALER_FILE: &str = "scaler.json";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    // Upload constraints
    pub max_file_size_mb: u32,
    pub allowed_formats: Vec<AudioFormat>,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,

    // Preprocessing
    pub target_sample_rate: u32,
    pub trim_top_db: f32,

    // Artifacts
    pub model_path: Option<PathBuf>,
    pub scaler_path: Option<PathBuf>,

    /// Wall-clock budget for validate + preprocess + extract (0 = unbounded)
    pub analysis_budget_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            max_file_size_mb: 10,
            allowed_formats: vec![
                AudioFormat::Wav,
                AudioFormat::Webm,
                AudioFormat::Mp3,
                AudioFormat::Ogg,
            ],
            min_duration_secs: 15.0,
            max_duration_secs: 60.0,
            target_sample_rate: 22050,
            trim_top_db: 20.0,
            model_path: None,
            scaler_path: None,
            analysis_budget_ms: 30_000,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from the default location or fall back to defaults
    pub fn load_or_default() -> Self {
        let loaded = Self::config_path().and_then(|path| Self::load(&path));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".voicehealth"))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the default models directory
    pub fn models_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("models"))
    }

    pub fn resolve_model_path(&self) -> Result<PathBuf> {
        match self.model_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::models_dir()?.join(DEFAULT_MODEL_FILE)),
        }
    }

    pub fn resolve_scaler_path(&self) -> Result<PathBuf> {
        match self.scaler_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::models_dir()?.join(DEFAULT_SCALER_FILE)),
        }
    }

    /// Maximum accepted upload size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        u64::from(self.max_file_size_mb) * 1024 * 1024
    }

    /// Analysis budget, `None` when unbounded
    pub fn analysis_budget(&self) -> Option<Duration> {
        (self.analysis_budget_ms > 0).then(|| Duration::from_millis(self.analysis_budget_ms))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Keys follow the deployment's environment names: `MODEL_PATH`,
    /// `SCALER_PATH`, `MAX_AUDIO_SIZE_MB`, `ALLOWED_AUDIO_FORMATS`,
    /// `MIN_AUDIO_DURATION_SEC`, `MAX_AUDIO_DURATION_SEC`,
    /// `TARGET_SAMPLE_RATE` and `ANALYSIS_BUDGET_MS`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MODEL_PATH") {
            self.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("SCALER_PATH") {
            self.scaler_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("MAX_AUDIO_SIZE_MB") {
            self.max_file_size_mb = parse_env("MAX_AUDIO_SIZE_MB", &value)?;
        }
        if let Some(value) = lookup("ALLOWED_AUDIO_FORMATS") {
            self.allowed_formats = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<AudioFormat>()
                        .map_err(|e| anyhow::anyhow!("ALLOWED_AUDIO_FORMATS: {}", e))
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(value) = lookup("MIN_AUDIO_DURATION_SEC") {
            self.min_duration_secs = parse_env("MIN_AUDIO_DURATION_SEC", &value)?;
        }
        if let Some(value) = lookup("MAX_AUDIO_DURATION_SEC") {
            self.max_duration_secs = parse_env("MAX_AUDIO_DURATION_SEC", &value)?;
        }
        if let Some(value) = lookup("TARGET_SAMPLE_RATE") {
            self.target_sample_rate = parse_env("TARGET_SAMPLE_RATE", &value)?;
        }
        if let Some(value) = lookup("ANALYSIS_BUDGET_MS") {
            self.analysis_budget_ms = parse_env("ANALYSIS_BUDGET_MS", &value)?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_mb == 0 {
            bail!("max_file_size_mb must be greater than zero");
        }
        if self.allowed_formats.is_empty() {
            bail!("allowed_formats must not be empty");
        }
        if !(self.min_duration_secs >= 0.0) || !self.max_duration_secs.is_finite() {
            bail!("duration bounds must be finite and non-negative");
        }
        if self.min_duration_secs > self.max_duration_secs {
            bail!(
                "min_duration_secs ({}) exceeds max_duration_secs ({})",
                self.min_duration_secs,
                self.max_duration_secs
            );
        }
        if !(8000..=192_000).contains(&self.target_sample_rate) {
            bail!(
                "target_sample_rate {} outside supported range 8000-192000",
                self.target_sample_rate
            );
        }
        if !(self.trim_top_db > 0.0) {
            bail!("trim_top_db must be positive");
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.max_file_size_mb, 10);
        assert_eq!(config.target_sample_rate, 22050);
        assert_eq!(config.allowed_formats.len(), 4);
        assert_eq!(config.min_duration_secs, 15.0);
        assert_eq!(config.max_duration_secs, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let config = Config::default();
        assert_eq!(config.max_file_size_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_analysis_budget_zero_is_unbounded() {
        let mut config = Config::default();
        assert_eq!(config.analysis_budget(), Some(Duration::from_secs(30)));
        config.analysis_budget_ms = 0;
        assert!(config.analysis_budget().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides_from(lookup_from(&[
                ("MODEL_PATH", "/srv/models/m.json"),
                ("MAX_AUDIO_SIZE_MB", "25"),
                ("ALLOWED_AUDIO_FORMATS", "wav, ogg"),
                ("MIN_AUDIO_DURATION_SEC", "5"),
                ("TARGET_SAMPLE_RATE", "16000"),
            ]))
            .unwrap();

        assert_eq!(config.model_path, Some(PathBuf::from("/srv/models/m.json")));
        assert!(config.scaler_path.is_none());
        assert_eq!(config.max_file_size_mb, 25);
        assert_eq!(config.allowed_formats, vec![AudioFormat::Wav, AudioFormat::Ogg]);
        assert_eq!(config.min_duration_secs, 5.0);
        assert_eq!(config.target_sample_rate, 16000);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        assert!(config
            .apply_overrides_from(lookup_from(&[("MAX_AUDIO_SIZE_MB", "lots")]))
            .is_err());
        assert!(config
            .apply_overrides_from(lookup_from(&[("ALLOWED_AUDIO_FORMATS", "wav,flac")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_durations() {
        let config = Config {
            min_duration_secs: 30.0,
            max_duration_secs: 10.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_formats() {
        let config = Config {
            allowed_formats: vec![],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            max_duration_secs: 45.0,
            model_path: Some(PathBuf::from("model.json")),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.max_duration_secs, 45.0);
        assert_eq!(loaded.model_path, Some(PathBuf::from("model.json")));
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.target_sample_rate, 22050);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_file_size_mb": 3 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_file_size_mb, 3);
        assert_eq!(config.max_duration_secs, 60.0);
    }

    #[test]
    fn test_resolve_explicit_paths() {
        let config = Config {
            model_path: Some(PathBuf::from("a.json")),
            scaler_path: Some(PathBuf::from("b.json")),
            ..Config::default()
        };
        assert_eq!(config.resolve_model_path().unwrap(), PathBuf::from("a.json"));
        assert_eq!(config.resolve_scaler_path().unwrap(), PathBuf::from("b.json"));
    }
}
