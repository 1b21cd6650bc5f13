//! Spoken feedback channel
//!
//! One global speech-output resource with cancel-then-speak semantics:
//! every utterance first silences whatever is playing, so feedback never
//! overlaps itself or an assistant reply. An interrupted flag persists
//! across await points so long flows (synthesis, OCR) can notice a barge-in
//! that happened while they were off doing network work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::PlaybackScheduler;
use crate::speech::tts::{TextToSpeech, decode_mp3};

/// Voice used for local confirmations and error feedback
pub struct FeedbackVoice {
    tts: TextToSpeech,
    interrupted: Arc<AtomicBool>,
}

impl FeedbackVoice {
    /// Wrap a TTS backend as the feedback voice
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel whatever is playing and speak `text`.
    ///
    /// Best-effort: synthesis failures are logged, not propagated, since
    /// feedback is itself the error surface. If an interrupt arrives while
    /// synthesis is in flight the result is discarded unplayed.
    pub async fn speak(&self, playback: &PlaybackScheduler, text: &str) {
        playback.stop_all();
        self.interrupted.store(false, Ordering::SeqCst);

        tracing::debug!(text, "speaking");
        let mp3 = match self.tts.synthesize(text).await {
            Ok(mp3) => mp3,
            Err(e) => {
                tracing::warn!(error = %e, "feedback synthesis failed");
                return;
            }
        };

        if self.is_interrupted() {
            tracing::debug!("feedback dropped, interrupted during synthesis");
            return;
        }

        match decode_mp3(&mp3) {
            Ok(samples) => playback.queue_samples(samples),
            Err(e) => tracing::warn!(error = %e, "feedback decode failed"),
        }
    }

    /// Speak and wait for playback to finish, unless interrupted
    pub async fn speak_and_wait(&self, playback: &PlaybackScheduler, text: &str) {
        self.speak(playback, text).await;
        while !playback.is_idle() {
            if self.is_interrupted() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// Silence playback and mark any in-flight utterance as cancelled
    pub fn interrupt(&self, playback: &PlaybackScheduler) {
        self.interrupted.store(true, Ordering::SeqCst);
        playback.stop_all();
    }

    /// True if an interrupt arrived since the last `speak`
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}
