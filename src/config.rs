use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{BackendKind, ModelVariant};
use crate::report::REPORT_FILE_NAME;
use crate::session::{SessionSettings, DEFAULT_CONFIDENCE, DEFAULT_FRAME_SKIP};

/// Env var naming an optional TOML config file.
pub const CONFIG_ENV: &str = "TRAFFIC_COUNTER_CONFIG";

const DEFAULT_MODELS_DIR: &str = "models";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    confidence: Option<f32>,
    model: Option<ModelVariant>,
    frame_skip: Option<u32>,
    backend: Option<BackendKind>,
    models_dir: Option<PathBuf>,
    report_path: Option<PathBuf>,
    camera_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterConfig {
    pub confidence: f32,
    pub model: ModelVariant,
    pub frame_skip: u32,
    pub backend: BackendKind,
    pub models_dir: PathBuf,
    pub report_path: PathBuf,
    pub camera_device: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self::from_file(CounterConfigFile::default())
    }
}

impl CounterConfig {
    /// Defaults, then the file named by `TRAFFIC_COUNTER_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honouring env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        Self {
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            model: file.model.unwrap_or_default(),
            frame_skip: file.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            backend: file.backend.unwrap_or_default(),
            models_dir: file
                .models_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR)),
            report_path: file
                .report_path
                .unwrap_or_else(|| PathBuf::from(REPORT_FILE_NAME)),
            camera_device: file
                .camera_device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("TRAFFIC_CONFIDENCE") {
            self.confidence = value
                .parse()
                .map_err(|_| anyhow!("TRAFFIC_CONFIDENCE must be a number (got '{}')", value))?;
        }
        if let Some(value) = env_value("TRAFFIC_MODEL") {
            self.model = value.parse()?;
        }
        if let Some(value) = env_value("TRAFFIC_FRAME_SKIP") {
            self.frame_skip = value.parse().map_err(|_| {
                anyhow!("TRAFFIC_FRAME_SKIP must be a positive integer (got '{}')", value)
            })?;
        }
        if let Some(value) = env_value("TRAFFIC_BACKEND") {
            self.backend = value.parse()?;
        }
        if let Some(value) = env_value("TRAFFIC_MODELS_DIR") {
            self.models_dir = PathBuf::from(value);
        }
        if let Some(value) = env_value("TRAFFIC_REPORT_PATH") {
            self.report_path = PathBuf::from(value);
        }
        if let Some(value) = env_value("TRAFFIC_CAMERA_DEVICE") {
            self.camera_device = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence must be within [0, 1] (got {})",
                self.confidence
            ));
        }
        if self.frame_skip == 0 {
            return Err(anyhow!("frame_skip must be >= 1"));
        }
        if self.camera_device.trim().is_empty() {
            return Err(anyhow!("camera_device must not be empty"));
        }
        Ok(())
    }

    pub fn video_settings(&self) -> SessionSettings {
        SessionSettings::video(self.confidence, self.frame_skip)
    }

    pub fn camera_settings(&self) -> SessionSettings {
        SessionSettings::camera(self.confidence)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_interactive_app() {
        let cfg = CounterConfig::default();
        assert_eq!(cfg.confidence, 0.25);
        assert_eq!(cfg.model, ModelVariant::YoloV8n);
        assert_eq!(cfg.frame_skip, 3);
        assert_eq!(cfg.report_path, PathBuf::from("traffic_report.csv"));
        assert_eq!(cfg.camera_device, "/dev/video0");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn session_settings_follow_mode() {
        let cfg = CounterConfig {
            confidence: 0.4,
            frame_skip: 5,
            ..CounterConfig::default()
        };
        assert_eq!(cfg.video_settings(), SessionSettings::video(0.4, 5));
        assert_eq!(cfg.camera_settings().frame_skip, 1);
    }
}
