//! Microphone capture pipeline
//!
//! Owns the input device and emits one wire-format PCM frame per audio
//! block through a caller-supplied callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::audio::pcm;
use crate::{Error, Result};

/// Sample rate for outbound audio (16kHz for speech)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Captures audio from the default input device.
///
/// Each cpal block is quantized to 16-bit PCM and forwarded in arrival order;
/// the conversion happens inside the audio callback and never blocks on locks
/// or IO.
pub struct AudioCapture {
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device and start streaming frames.
    ///
    /// The callback receives one encoded frame per processing block. Frames
    /// are delivered in capture order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no input device exists or no
    /// 16kHz mono config is supported; no callback is registered in that case.
    pub fn open<F>(mut on_frame: F) -> Result<Self>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no 16kHz mono input config found".to_string())
            })?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(INPUT_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = INPUT_SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    on_frame(pcm::encode(data));
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!("audio capture started");
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Stop capturing and release the microphone. Idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if the microphone is currently held open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.close();
    }
}
