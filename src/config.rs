//! Configuration management for the Lumen gateway
//!
//! Loaded from a TOML file in the platform config directory, with
//! environment-variable overrides for credentials.

use std::path::PathBuf;

use serde::Deserialize;

use crate::live::WsEndpoint;
use crate::live::ocr::TextReader;
use crate::navigation::IpLocationProvider;
use crate::speech::{SpeechToText, TextToSpeech};
use crate::{Error, Result};

/// Lumen gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the live session, STT, TTS, and vision endpoints
    /// (from `LUMEN_API_KEY` env)
    pub api_key: String,

    /// Live session configuration
    pub live: LiveConfig,

    /// Local speech services configuration
    pub speech: SpeechConfig,

    /// Vision (text reading) configuration
    pub vision: VisionConfig,

    /// Navigation configuration
    pub navigation: NavigationConfig,
}

/// Live session endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket URL of the live endpoint
    pub url: String,

    /// Live model identifier
    pub model: String,
}

/// Speech service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Transcription endpoint URL
    pub stt_url: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// Synthesis endpoint URL
    pub tts_url: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// Vision endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Image understanding endpoint URL
    pub ocr_url: String,

    /// Vision model identifier
    pub ocr_model: String,
}

/// Navigation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// IP geolocation service URL
    pub geolocation_url: String,

    /// Map embed API key; empty means the coordinate-only fallback is used
    /// (from `LUMEN_MAP_API_KEY` env)
    pub map_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            live: LiveConfig::default(),
            speech: SpeechConfig::default(),
            vision: VisionConfig::default(),
            navigation: NavigationConfig::default(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.lumen.dev/v1/live".to_string(),
            model: "lumen-live-1".to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_url: "https://api.openai.com/v1/audio/speech".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            ocr_url: "https://api.lumen.dev/v1/vision/read".to_string(),
            ocr_model: "lumen-vision-1".to_string(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            geolocation_url: "http://ip-api.com/json".to_string(),
            map_api_key: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from the platform config directory, falling back
    /// to defaults, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config");
                let text = std::fs::read_to_string(&path)?;
                toml::from_str(&text)?
            }
            _ => Self::default(),
        };

        if let Ok(key) = std::env::var("LUMEN_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("LUMEN_LIVE_URL") {
            config.live.url = url;
        }
        if let Ok(model) = std::env::var("LUMEN_LIVE_MODEL") {
            config.live.model = model;
        }
        if let Ok(key) = std::env::var("LUMEN_MAP_API_KEY") {
            config.navigation.map_api_key = key;
        }

        Ok(config)
    }

    /// Platform config file location
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "lumen", "lumen")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Require the shared API key to be set
    fn require_api_key(&self) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Config(
                "LUMEN_API_KEY not set and no api_key in config".to_string(),
            ));
        }
        Ok(self.api_key.clone())
    }

    /// Build the live WebSocket endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the key is missing.
    pub fn live_endpoint(&self) -> Result<WsEndpoint> {
        WsEndpoint::new(&self.live.url, self.require_api_key()?)
    }

    /// Build the STT client
    ///
    /// # Errors
    ///
    /// Returns error if the key is missing.
    pub fn speech_to_text(&self) -> Result<SpeechToText> {
        SpeechToText::new(
            self.speech.stt_url.clone(),
            self.require_api_key()?,
            self.speech.stt_model.clone(),
        )
    }

    /// Build the TTS backend for the feedback voice
    ///
    /// # Errors
    ///
    /// Returns error if the key is missing.
    pub fn feedback_tts(&self) -> Result<TextToSpeech> {
        TextToSpeech::new(
            self.speech.tts_url.clone(),
            self.require_api_key()?,
            self.speech.tts_voice.clone(),
            self.speech.tts_speed,
            self.speech.tts_model.clone(),
        )
    }

    /// Build the single-shot text reader
    ///
    /// # Errors
    ///
    /// Returns error if the key is missing.
    pub fn text_reader(&self) -> Result<TextReader> {
        TextReader::new(
            self.vision.ocr_url.clone(),
            self.require_api_key()?,
            self.vision.ocr_model.clone(),
        )
    }

    /// Build the location provider
    #[must_use]
    pub fn location_provider(&self) -> IpLocationProvider {
        IpLocationProvider::new(self.navigation.geolocation_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert!(!config.live.url.is_empty());
        assert!(!config.speech.stt_model.is_empty());
        assert!((config.speech.tts_speed - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_key = "test-key"

            [live]
            model = "lumen-live-2"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.live.model, "lumen-live-2");
        // Unspecified sections keep their defaults.
        assert_eq!(config.speech.tts_voice, "alloy");
        assert!(config.navigation.map_api_key.is_empty());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(
            config.speech_to_text(),
            Err(Error::Config(_))
        ));
    }
}
