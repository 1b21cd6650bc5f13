//! Single-shot text reading
//!
//! READ mode captures one frame and asks the vision endpoint to transcribe
//! the text in it. The result is spoken, so every failure path degrades to a
//! fixed apology instead of an error the user cannot act on.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Spoken when the OCR request fails for any reason
pub const READ_FAILED: &str = "Sorry, I couldn't read that.";

/// Spoken when the request succeeds but the frame contains no text
pub const NO_TEXT: &str = "No text detected.";

const OCR_INSTRUCTION: &str =
    "Read all text visible in this image, exactly as written, in natural \
     reading order. Output only the text itself. If there is no readable \
     text, output nothing.";

#[derive(serde::Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    instruction: &'a str,
    image: ImagePart,
}

#[derive(serde::Serialize)]
struct ImagePart {
    mime_type: &'static str,
    data: String,
}

#[derive(serde::Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

/// Reads printed text out of captured frames
pub struct TextReader {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl TextReader {
    /// Create a text reader against the vision endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is empty.
    pub fn new(url: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "vision API key required for text reading".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model,
        })
    }

    /// Transcribe the text in a JPEG frame.
    ///
    /// Always returns something speakable: the transcribed text, [`NO_TEXT`]
    /// when the frame is blank, or [`READ_FAILED`] when the request fails.
    pub async fn read_image(&self, jpeg: &[u8]) -> String {
        match self.request(jpeg).await {
            Ok(text) if text.trim().is_empty() => NO_TEXT.to_string(),
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "text reading failed");
                READ_FAILED.to_string()
            }
        }
    }

    async fn request(&self, jpeg: &[u8]) -> Result<String> {
        tracing::debug!(image_bytes = jpeg.len(), "requesting text transcription");

        let request = OcrRequest {
            model: &self.model,
            instruction: OCR_INSTRUCTION,
            image: ImagePart {
                mime_type: "image/jpeg",
                data: BASE64.encode(jpeg),
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ocr(format!("vision API error {status}: {body}")));
        }

        let result: OcrResponse = response.json().await?;
        Ok(result.text)
    }
}
