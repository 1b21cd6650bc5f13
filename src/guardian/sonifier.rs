//! Motion sonification
//!
//! A continuously-running sine oscillator whose pitch and volume track the
//! motion score. Parameter changes are smoothed with one-pole filters so the
//! tone glides instead of stepping audibly; fading to silence uses a slower
//! time constant than following a new target.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

const SONIFIER_SAMPLE_RATE: u32 = 44_100;

/// Time constant for tracking a new tone target
const ATTACK_SECONDS: f32 = 0.1;

/// Time constant for fading to silence
const RELEASE_SECONDS: f32 = 0.2;

#[derive(Clone, Copy, Default)]
struct ToneTarget {
    frequency: f32,
    volume: f32,
}

/// Hazard tone generator on the default output device
pub struct Sonifier {
    stream: Option<Stream>,
    target: Arc<Mutex<ToneTarget>>,
}

impl Sonifier {
    /// Open the oscillator, initially silent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no output device exists.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.min_sample_rate() <= SampleRate(SONIFIER_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SONIFIER_SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable output config found".to_string())
            })?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(SONIFIER_SAMPLE_RATE))
            .config();
        let channels = config.channels as usize;

        let target: Arc<Mutex<ToneTarget>> = Arc::new(Mutex::new(ToneTarget::default()));
        let target_for_stream = Arc::clone(&target);

        #[allow(clippy::cast_precision_loss)]
        let rate = SONIFIER_SAMPLE_RATE as f32;
        let attack = 1.0 - (-1.0 / (ATTACK_SECONDS * rate)).exp();
        let release = 1.0 - (-1.0 / (RELEASE_SECONDS * rate)).exp();

        let mut phase: f32 = 0.0;
        let mut frequency: f32 = 400.0;
        let mut volume: f32 = 0.0;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let tone = match target_for_stream.lock() {
                        Ok(t) => *t,
                        Err(poisoned) => *poisoned.into_inner(),
                    };
                    for frame in data.chunks_mut(channels) {
                        let alpha = if tone.volume < volume { release } else { attack };
                        volume += (tone.volume - volume) * alpha;
                        if tone.frequency > 0.0 {
                            frequency += (tone.frequency - frequency) * attack;
                        }

                        phase += 2.0 * PI * frequency / rate;
                        if phase > 2.0 * PI {
                            phase -= 2.0 * PI;
                        }
                        let sample = phase.sin() * volume;
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "sonifier stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!("sonifier started");
        Ok(Self {
            stream: Some(stream),
            target,
        })
    }

    /// Glide toward the given pitch and volume
    pub fn set_tone(&self, frequency: f32, volume: f32) {
        let mut target = match self.target.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        target.frequency = frequency;
        target.volume = volume;
    }

    /// Fade out over the release time constant
    pub fn silence(&self) {
        let mut target = match self.target.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        target.volume = 0.0;
    }

    /// Tear down the oscillator. Idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("sonifier closed");
        }
    }
}

impl Drop for Sonifier {
    fn drop(&mut self) {
        self.close();
    }
}
