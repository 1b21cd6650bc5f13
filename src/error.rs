//! Error types for the Lumen gateway

use thiserror::Error;

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Lumen gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone or camera missing, busy, or denied
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio pipeline error
    #[error("audio error: {0}")]
    Audio(String),

    /// Camera frame acquisition or encoding error
    #[error("frame error: {0}")]
    Frame(String),

    /// The extended-capability session config was refused by the backend.
    /// Recovered locally by retrying with the minimal capability tier.
    #[error("transport rejected: {0}")]
    TransportRejected(String),

    /// Both capability tiers failed, or the model/credentials are invalid
    #[error("transport fatal: {0}")]
    TransportFatal(String),

    /// Remote OCR call failed
    #[error("ocr error: {0}")]
    Ocr(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Map credential or map network failure; recovered by the
    /// coordinate-only fallback view
    #[error("map unavailable: {0}")]
    MapUnavailable(String),

    /// Location acquisition error
    #[error("location error: {0}")]
    Location(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
