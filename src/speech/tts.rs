//! Text-to-speech for feedback utterances

use std::io::Cursor;

use crate::{Error, Result};

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    url: String,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        url: String,
        api_key: String,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("TTS API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            voice,
            speed,
            model,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS API error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if decoding fails
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
