//! Utterance segmentation
//!
//! Splits the continuous microphone stream into discrete utterances using
//! local energy detection, so only finished phrases are sent for
//! transcription.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech for a valid utterance (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration marking the end of an utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Accumulates audio blocks into complete utterances
pub struct UtteranceSegmenter {
    state: SegmenterState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSegmenter {
    /// Create an idle segmenter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed one block of samples.
    ///
    /// Returns the accumulated utterance once enough speech has been followed
    /// by trailing silence; the segmenter resets to idle afterwards.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            SegmenterState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                // Trailing silence does not count toward the speech minimum,
                // so a brief noise followed by quiet never completes.
                let speech_len = self.speech_buffer.len().saturating_sub(self.silence_counter);
                if self.silence_counter > SILENCE_SAMPLES && speech_len > MIN_SPEECH_SAMPLES {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    let utterance = std::mem::take(&mut self.speech_buffer);
                    self.reset();
                    return Some(utterance);
                }

                // Too much silence without enough speech: not an utterance
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("timeout, resetting");
                    self.reset();
                }
            }
        }

        None
    }

    /// Discard any partial utterance and return to idle
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
