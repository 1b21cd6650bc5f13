//! Voice-command recognizer
//!
//! Always-on local listener that runs only while no live session is active.
//! Transcripts are evaluated against ordered intent rules; the rule order is
//! load-bearing, in particular the carve-outs between the standalone "stop"
//! command and guardian deactivation.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{AudioCapture, INPUT_SAMPLE_RATE, pcm};
use crate::orchestrator::Mode;
use crate::speech::stt::SpeechToText;
use crate::speech::{UtteranceSegmenter, samples_to_wav};
use crate::Result;

/// Command-vocabulary words that always cut off in-progress speech output
const INTERRUPT_WORDS: &[&str] = &[
    "stop",
    "capture",
    "navigate",
    "read",
    "guardian",
    "lumen",
    "activate",
    "start",
    "describe",
    "insight",
    "deactivate",
    "disable",
    "off",
];

/// Words that deactivate the guardian when combined with "guardian"
const GUARDIAN_OFF_WORDS: &[&str] = &["off", "stop", "disable", "deactivate"];

/// Words that explicitly activate the guardian
const GUARDIAN_ON_WORDS: &[&str] = &["on", "start", "enable", "activate"];

/// Phrases that start a session without changing mode
const WAKE_PHRASES: &[&str] = &[
    "activate session",
    "start session",
    "open session",
    "lumen start",
    "lumen wake up",
];

/// What a recognized transcript asks the orchestrator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Nothing recognized
    None,
    /// Pure silence command; no state change
    Silence,
    /// Trigger the read-mode capture flow; no session start
    Capture,
    /// Turn the guardian off, confirm aloud; no session, no mode change
    DeactivateGuardian,
    /// Start a session, optionally switching mode or enabling the guardian
    /// first. A `Read` target applies the mode but never starts a session.
    StartSession {
        mode: Option<Mode>,
        activate_guardian: bool,
    },
}

/// Result of evaluating one transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Cut off any in-progress speech output before acting
    pub interrupt_speech: bool,
    pub action: CommandAction,
}

/// True when `word` appears as a whole word in `text`
fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

fn has_any_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| has_word(text, w))
}

/// Evaluate a finalized transcript against the ordered intent rules.
///
/// The interrupt check is independent of the action rules and always runs;
/// among the action rules the first match wins.
#[must_use]
pub fn parse_transcript(transcript: &str, current_mode: Mode) -> CommandOutcome {
    let text = transcript.to_lowercase();
    let text = text.trim();

    let interrupt_speech = has_any_word(text, INTERRUPT_WORDS);

    // Standalone stop: pure silence, unless the guardian is mentioned, in
    // which case the deactivation rule below must win.
    if (has_word(text, "stop") || text.contains("shut up")) && !has_word(text, "guardian") {
        return CommandOutcome {
            interrupt_speech,
            action: CommandAction::Silence,
        };
    }

    // Capture works session-free, but only in read mode.
    if has_word(text, "capture") && current_mode == Mode::Read {
        return CommandOutcome {
            interrupt_speech,
            action: CommandAction::Capture,
        };
    }

    if has_word(text, "guardian") {
        if has_any_word(text, GUARDIAN_OFF_WORDS) {
            return CommandOutcome {
                interrupt_speech,
                action: CommandAction::DeactivateGuardian,
            };
        }
        return CommandOutcome {
            interrupt_speech,
            action: CommandAction::StartSession {
                mode: Some(Mode::Guardian),
                activate_guardian: has_any_word(text, GUARDIAN_ON_WORDS),
            },
        };
    }

    let mode = if text.contains("read mode") || text.contains("read this") {
        Some(Mode::Read)
    } else if has_word(text, "navigate") || has_word(text, "navigation") || text.contains("take me to")
    {
        Some(Mode::Navigate)
    } else if has_word(text, "describe") || has_word(text, "insight") || text.contains("standard mode")
    {
        Some(Mode::Describe)
    } else {
        None
    };

    if let Some(mode) = mode {
        return CommandOutcome {
            interrupt_speech,
            action: CommandAction::StartSession {
                mode: Some(mode),
                activate_guardian: false,
            },
        };
    }

    if WAKE_PHRASES.iter().any(|p| text.contains(p)) {
        return CommandOutcome {
            interrupt_speech,
            action: CommandAction::StartSession {
                mode: None,
                activate_guardian: false,
            },
        };
    }

    CommandOutcome {
        interrupt_speech,
        action: CommandAction::None,
    }
}

/// Runtime listener: microphone capture, utterance segmentation, and
/// best-effort transcription while no session holds the microphone.
pub struct CommandRecognizer {
    capture: AudioCapture,
    blocks: mpsc::UnboundedReceiver<Vec<f32>>,
    segmenter: UtteranceSegmenter,
    stt: Arc<SpeechToText>,
}

impl CommandRecognizer {
    /// Open the microphone and start listening.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the microphone cannot
    /// be opened.
    pub fn start(stt: Arc<SpeechToText>) -> Result<Self> {
        let (tx, blocks) = mpsc::unbounded_channel();
        let capture = AudioCapture::open(move |frame| {
            let _ = tx.send(pcm::decode(&frame));
        })?;

        tracing::debug!("command recognizer listening");
        Ok(Self {
            capture,
            blocks,
            segmenter: UtteranceSegmenter::new(),
            stt,
        })
    }

    /// Drain buffered audio; if an utterance completed, transcribe it.
    ///
    /// Transcription failures are logged and swallowed: the listener keeps
    /// running and the user simply repeats themselves.
    pub async fn poll(&mut self) -> Option<String> {
        let mut utterance = None;
        while let Ok(block) = self.blocks.try_recv() {
            if let Some(done) = self.segmenter.push(&block) {
                utterance = Some(done);
            }
        }
        let samples = utterance?;

        let wav = match samples_to_wav(&samples, INPUT_SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "utterance encoding failed");
                return None;
            }
        };

        match self.stt.transcribe(&wav).await {
            Ok(transcript) if !transcript.trim().is_empty() => Some(transcript),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "command transcription failed");
                None
            }
        }
    }

    /// Release the microphone. The instance cannot be restarted; the
    /// orchestrator constructs a fresh recognizer when listening resumes.
    pub fn stop(&mut self) {
        self.capture.close();
        self.segmenter.reset();
        tracing::debug!("command recognizer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_guardian_deactivates_without_session_or_mode_change() {
        let outcome = parse_transcript("stop guardian", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::DeactivateGuardian);
        assert!(outcome.interrupt_speech);
    }

    #[test]
    fn guardian_on_activates_and_starts_session() {
        let outcome = parse_transcript("guardian on", Mode::Describe);
        assert_eq!(
            outcome.action,
            CommandAction::StartSession {
                mode: Some(Mode::Guardian),
                activate_guardian: true,
            }
        );
    }

    #[test]
    fn bare_guardian_targets_guardian_mode_without_activation() {
        let outcome = parse_transcript("guardian", Mode::Describe);
        assert_eq!(
            outcome.action,
            CommandAction::StartSession {
                mode: Some(Mode::Guardian),
                activate_guardian: false,
            }
        );
    }

    #[test]
    fn capture_in_read_mode_triggers_capture() {
        let outcome = parse_transcript("capture", Mode::Read);
        assert_eq!(outcome.action, CommandAction::Capture);
    }

    #[test]
    fn capture_outside_read_mode_does_nothing() {
        let outcome = parse_transcript("capture", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::None);
        // "capture" is still in the interrupt vocabulary.
        assert!(outcome.interrupt_speech);
    }

    #[test]
    fn read_this_switches_mode() {
        let outcome = parse_transcript("read this", Mode::Describe);
        assert_eq!(
            outcome.action,
            CommandAction::StartSession {
                mode: Some(Mode::Read),
                activate_guardian: false,
            }
        );
    }

    #[test]
    fn standalone_stop_is_pure_silence() {
        let outcome = parse_transcript("stop", Mode::Navigate);
        assert_eq!(outcome.action, CommandAction::Silence);
        assert!(outcome.interrupt_speech);

        let outcome = parse_transcript("stop reading", Mode::Read);
        assert_eq!(outcome.action, CommandAction::Silence);
    }

    #[test]
    fn shut_up_silences_without_vocabulary_match() {
        let outcome = parse_transcript("oh shut up", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::Silence);
    }

    #[test]
    fn take_me_to_switches_to_navigate() {
        let outcome = parse_transcript("take me to the station", Mode::Describe);
        assert_eq!(
            outcome.action,
            CommandAction::StartSession {
                mode: Some(Mode::Navigate),
                activate_guardian: false,
            }
        );
    }

    #[test]
    fn wake_phrase_starts_session_without_mode_change() {
        for phrase in ["activate session", "lumen wake up", "Start Session please"] {
            let outcome = parse_transcript(phrase, Mode::Describe);
            assert_eq!(
                outcome.action,
                CommandAction::StartSession {
                    mode: None,
                    activate_guardian: false,
                },
                "phrase: {phrase}"
            );
        }
    }

    #[test]
    fn unrelated_speech_is_ignored() {
        let outcome = parse_transcript("what a nice day", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::None);
        assert!(!outcome.interrupt_speech);
    }

    #[test]
    fn vocabulary_matches_whole_words_only() {
        // "office" must not trigger on "off", "ready" not on "read".
        let outcome = parse_transcript("the office is ready", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::None);
        assert!(!outcome.interrupt_speech);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let outcome = parse_transcript("  STOP Guardian  ", Mode::Describe);
        assert_eq!(outcome.action, CommandAction::DeactivateGuardian);
    }
}
