//! Speech-to-text for the command recognizer
//!
//! Best-effort transcription of finished utterances against a Whisper-style
//! HTTP endpoint. Failures are logged and surface as an absent transcript,
//! never as a crash of the listening loop.

use crate::{Error, Result};

/// Response from a Whisper-style transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl SpeechToText {
    /// Create a new STT instance
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(url: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "STT API key required for voice commands".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model,
        })
    }

    /// Transcribe audio to text
    ///
    /// # Arguments
    ///
    /// * `audio` - WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Stt(format!("STT API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
