//! Voice pipeline integration tests
//!
//! Tests the utterance segmenter and WAV encoding without audio hardware

use std::io::Cursor;

use lumen_gateway::audio::INPUT_SAMPLE_RATE;
use lumen_gateway::speech::segmenter::{SegmenterState, UtteranceSegmenter};
use lumen_gateway::speech::{CommandAction, parse_transcript, samples_to_wav};
use lumen_gateway::Mode;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (INPUT_SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / INPUT_SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (INPUT_SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Feed a stream block by block, returning the first completed utterance
fn feed(segmenter: &mut UtteranceSegmenter, samples: &[f32]) -> Option<Vec<f32>> {
    let mut result = None;
    for block in samples.chunks(1600) {
        if let Some(utterance) = segmenter.push(block) {
            result = Some(utterance);
        }
    }
    result
}

#[test]
fn test_silence_never_triggers() {
    let mut segmenter = UtteranceSegmenter::new();
    let silence = generate_silence(2.0);

    assert!(feed(&mut segmenter, &silence).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_speech_starts_listening() {
    let mut segmenter = UtteranceSegmenter::new();
    let speech = generate_sine_samples(440.0, 0.2, 0.3);

    assert!(feed(&mut segmenter, &speech).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Listening);
}

#[test]
fn test_speech_then_silence_completes_utterance() {
    let mut segmenter = UtteranceSegmenter::new();

    let mut stream = generate_sine_samples(440.0, 0.5, 0.3);
    stream.extend(generate_silence(0.7));

    let utterance = feed(&mut segmenter, &stream).expect("utterance should complete");

    // The utterance contains the speech plus the trailing silence fed so far.
    assert!(utterance.len() >= (INPUT_SAMPLE_RATE as usize) / 2);
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_short_blip_is_discarded() {
    let mut segmenter = UtteranceSegmenter::new();

    // 0.1s of sound is below the minimum speech duration.
    let mut stream = generate_sine_samples(440.0, 0.1, 0.3);
    stream.extend(generate_silence(1.5));

    assert!(feed(&mut segmenter, &stream).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_resets_between_utterances() {
    let mut segmenter = UtteranceSegmenter::new();

    let mut first = generate_sine_samples(440.0, 0.5, 0.3);
    first.extend(generate_silence(0.7));
    assert!(feed(&mut segmenter, &first).is_some());

    let mut second = generate_sine_samples(220.0, 0.4, 0.3);
    second.extend(generate_silence(0.7));
    assert!(feed(&mut segmenter, &second).is_some());
}

#[test]
fn test_explicit_reset_discards_partial_speech() {
    let mut segmenter = UtteranceSegmenter::new();

    let speech = generate_sine_samples(440.0, 0.4, 0.3);
    feed(&mut segmenter, &speech);
    assert_eq!(segmenter.state(), SegmenterState::Listening);

    segmenter.reset();
    assert_eq!(segmenter.state(), SegmenterState::Idle);

    // The discarded speech must not leak into the next utterance.
    let silence = generate_silence(1.0);
    assert!(feed(&mut segmenter, &silence).is_none());
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, INPUT_SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV should have reasonable size
    assert!(wav_data.len() > 44); // WAV header is 44 bytes
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, INPUT_SAMPLE_RATE).unwrap();

    // Read WAV back
    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, INPUT_SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
}

#[test]
fn test_utterance_to_command_flow() {
    // End to end minus the network: a completed utterance whose transcript
    // carries a mode phrase yields a session-start action.
    let mut segmenter = UtteranceSegmenter::new();
    let mut stream = generate_sine_samples(300.0, 0.6, 0.3);
    stream.extend(generate_silence(0.7));

    let utterance = feed(&mut segmenter, &stream).expect("utterance should complete");
    assert!(samples_to_wav(&utterance, INPUT_SAMPLE_RATE).is_ok());

    let outcome = parse_transcript("take me to the park", Mode::Describe);
    assert_eq!(
        outcome.action,
        CommandAction::StartSession {
            mode: Some(Mode::Navigate),
            activate_guardian: false,
        }
    );
}
