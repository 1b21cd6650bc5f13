//! Local speech services: utterance segmentation, best-effort transcription,
//! the voice-command recognizer, and the spoken-feedback channel.

pub mod feedback;
pub mod recognizer;
pub mod segmenter;
pub mod stt;
pub mod tts;

pub use feedback::FeedbackVoice;
pub use recognizer::{CommandAction, CommandOutcome, CommandRecognizer, parse_transcript};
pub use segmenter::UtteranceSegmenter;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::{Error, Result};

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
