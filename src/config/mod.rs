use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::error::prelude::*;
use crate::live::SessionConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config.toml: {0}")]
    Read(String),

    #[error("Failed to parse config.toml: {0}")]
    Parse(String),

    #[error("Failed to write config.toml: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_live_url")]
    pub live_url: String,
    #[serde(default = "default_live_model")]
    pub live_model: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_lesson_model")]
    pub lesson_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/".to_string()
}

fn default_live_url() -> String {
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string()
}

fn default_live_model() -> String {
    "gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_lesson_model() -> String {
    "gemini-3-pro-preview".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            live_url: default_live_url(),
            live_model: default_live_model(),
            text_model: default_text_model(),
            lesson_model: default_lesson_model(),
            tts_model: default_tts_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveConfig {
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_tutor_name")]
    pub tutor_name: String,
    #[serde(default = "default_translation_debounce_ms")]
    pub translation_debounce_ms: u64,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
    #[serde(default = "default_render_fps")]
    pub render_fps: u32,
}

fn default_voice() -> String {
    "Kore".to_string()
}

fn default_tutor_name() -> String {
    "Chen Laoshi".to_string()
}

fn default_translation_debounce_ms() -> u64 {
    800
}

fn default_frame_size() -> usize {
    4096
}

fn default_frame_queue_capacity() -> usize {
    32
}

fn default_render_fps() -> u32 {
    30
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            tutor_name: default_tutor_name(),
            translation_debounce_ms: default_translation_debounce_ms(),
            frame_size: default_frame_size(),
            frame_queue_capacity: default_frame_queue_capacity(),
            render_fps: default_render_fps(),
        }
    }
}

impl LiveConfig {
    pub fn render_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.render_fps.max(1) as f64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl AppConfig {
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "laoshi-live")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using default config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::Write("Could not determine config path".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("Failed to create config directory: {e}"))
            })?;
        }

        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Write(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, toml_str)
            .map_err(|e| ConfigError::Write(format!("Failed to write file: {e}")))
    }

    /// Read the API key, loading a `.env` file first if one is present.
    pub fn api_key(&self) -> Result<String, ServiceError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        match std::env::var(&self.api.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ServiceError::MissingApiKey(self.api.api_key_env.clone())),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.api.live_model.clone(),
            voice: self.live.voice.clone(),
            tutor_name: self.live.tutor_name.clone(),
            translation_delay: Duration::from_millis(self.live.translation_debounce_ms),
            frame_queue_capacity: self.live.frame_queue_capacity,
        }
    }
}
