use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub speaker: String,
    pub language: String,
    pub speed: f64,

    #[serde(default = "default_api_name")]
    pub api_name: String,

    /// Relative paths are resolved against the directory holding the config file.
    pub output_dir: PathBuf,

    /// Hugging Face Space id (`owner/name`) or a full Gradio base URL.
    #[serde(default = "default_space")]
    pub space: String,

    #[serde(default)]
    pub hf_token: Option<String>,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

/// The part of the configuration that selects the voice for a synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub speaker: String,
    pub language: String,
    pub speed: f64,
    pub api_name: String,
}

fn default_api_name() -> String {
    "/tts_fn".to_string()
}
fn default_space() -> String {
    "Plachta/VITS-Umamusume-voice-synthesizer".to_string()
}
fn default_format() -> String {
    "mp3".to_string()
}
fn default_bitrate() -> String {
    "192k".to_string()
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&content, base_dir)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parses JSON or YAML config text and resolves `output_dir` against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Config = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        if config.output_dir.is_relative() {
            config.output_dir = base_dir.join(&config.output_dir);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.speaker.trim().is_empty() {
            bail!("speaker must not be empty");
        }
        if self.language.trim().is_empty() {
            bail!("language must not be empty");
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            bail!("speed must be a positive number, got {}", self.speed);
        }
        if self.output_dir.as_os_str().is_empty() {
            bail!("output_dir must not be empty");
        }
        if self.api_name.trim_start_matches('/').is_empty() {
            bail!("api_name must name an endpoint");
        }
        Ok(())
    }

    pub fn voice(&self) -> VoiceSettings {
        VoiceSettings {
            speaker: self.speaker.clone(),
            language: self.language.clone(),
            speed: self.speed,
            api_name: self.api_name.clone(),
        }
    }
}
