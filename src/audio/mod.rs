//! Audio pipeline: PCM wire codec, microphone capture, and the gapless
//! playback scheduler.

pub mod capture;
pub mod pcm;
pub mod playback;

pub use capture::{AudioCapture, INPUT_SAMPLE_RATE};
pub use playback::{PlaybackScheduler, Timeline, OUTPUT_SAMPLE_RATE};
