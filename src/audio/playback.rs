//! Gapless playback scheduler
//!
//! Decoded PCM buffers arrive with network jitter but must play back-to-back
//! with no gap and no overlap. A persistent output stream drains a shared
//! sample queue, so contiguity holds by construction, while a [`Timeline`]
//! tracks the scheduling cursor and the set of in-flight buffers for
//! interrupt semantics and drain detection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::audio::pcm;
use crate::{Error, Result};

/// Sample rate for inbound assistant audio
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// A scheduled buffer's span on the playback timeline
#[derive(Debug, Clone, Copy)]
struct Span {
    end: Duration,
}

/// Pure scheduling state: the monotonic "next start time" cursor plus the
/// set of scheduled, not-yet-finished buffers.
///
/// Time is expressed as an offset from an arbitrary epoch supplied by the
/// caller, which keeps the math testable without an audio clock.
#[derive(Debug, Default)]
pub struct Timeline {
    next_start: Duration,
    active: Vec<Span>,
}

impl Timeline {
    /// Create an empty timeline with the cursor at the epoch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a buffer of `duration` at `max(cursor, now)`.
    ///
    /// Returns the start time. The cursor advances by `duration`, so
    /// successive calls schedule strictly back-to-back.
    pub fn schedule(&mut self, now: Duration, duration: Duration) -> Duration {
        self.retire(now);
        let start = self.next_start.max(now);
        self.next_start = start + duration;
        self.active.push(Span {
            end: self.next_start,
        });
        start
    }

    /// Silence everything: clear all in-flight buffers and reset the cursor
    /// to `now` so the next buffer starts without delay.
    pub fn stop_all(&mut self, now: Duration) -> usize {
        let stopped = self.active.len();
        self.active.clear();
        self.next_start = now;
        stopped
    }

    /// The next start time
    #[must_use]
    pub const fn cursor(&self) -> Duration {
        self.next_start
    }

    /// Number of buffers still playing at `now`
    pub fn active_count(&mut self, now: Duration) -> usize {
        self.retire(now);
        self.active.len()
    }

    /// True once every scheduled buffer has finished
    pub fn is_idle(&mut self, now: Duration) -> bool {
        self.active_count(now) == 0
    }

    /// Drop buffers that completed naturally
    fn retire(&mut self, now: Duration) {
        self.active.retain(|span| span.end > now);
    }
}

/// Schedules decoded audio for gapless playback on the default output device
pub struct PlaybackScheduler {
    stream: Option<Stream>,
    queue: Arc<Mutex<VecDeque<f32>>>,
    timeline: Mutex<Timeline>,
    epoch: Instant,
}

impl PlaybackScheduler {
    /// Open the default output device at 24kHz.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no output device or suitable
    /// config exists.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable output config found".to_string())
            })?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(OUTPUT_SAMPLE_RATE))
            .config();
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = OUTPUT_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_for_stream = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut q = match queue_for_stream.lock() {
                        Ok(q) => q,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = q.pop_front().unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            queue,
            timeline: Mutex::new(Timeline::new()),
            epoch: Instant::now(),
        })
    }

    /// Decode a wire-format PCM buffer and queue it for playback
    pub fn play_audio_data(&self, bytes: &[u8]) {
        self.queue_samples(pcm::decode(bytes));
    }

    /// Queue decoded samples immediately after whatever is already scheduled
    pub fn queue_samples(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(OUTPUT_SAMPLE_RATE));
        let now = self.epoch.elapsed();

        let start = match self.timeline.lock() {
            Ok(mut tl) => tl.schedule(now, duration),
            Err(poisoned) => poisoned.into_inner().schedule(now, duration),
        };
        tracing::trace!(?start, ?duration, samples = samples.len(), "buffer scheduled");

        let mut q = match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        q.extend(samples);
    }

    /// Barge-in primitive: silence every scheduled buffer and reset the
    /// cursor to now so audio queued immediately afterward starts at once.
    pub fn stop_all(&self) {
        let dropped = {
            let mut q = match self.queue.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            let n = q.len();
            q.clear();
            n
        };

        let now = self.epoch.elapsed();
        let stopped = match self.timeline.lock() {
            Ok(mut tl) => tl.stop_all(now),
            Err(poisoned) => poisoned.into_inner().stop_all(now),
        };

        if stopped > 0 {
            tracing::debug!(buffers = stopped, samples = dropped, "playback interrupted");
        }
    }

    /// True once every queued buffer has finished playing
    pub fn is_idle(&self) -> bool {
        let now = self.epoch.elapsed();
        match self.timeline.lock() {
            Ok(mut tl) => tl.is_idle(now),
            Err(poisoned) => poisoned.into_inner().is_idle(now),
        }
    }

    /// Wait until playback drains, with a safety timeout
    pub async fn drain(&self) {
        let deadline = Instant::now() + Duration::from_secs(120);
        while !self.is_idle() {
            if Instant::now() > deadline {
                tracing::warn!("playback drain timed out");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Stop playback and tear down the output stream. Idempotent.
    pub fn close(&mut self) {
        self.stop_all();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback closed");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn buffers_schedule_back_to_back() {
        let mut tl = Timeline::new();
        let first = tl.schedule(secs(0), secs(2));
        let second = tl.schedule(secs(0), secs(3));
        let third = tl.schedule(secs(0), secs(1));

        assert_eq!(first, secs(0));
        assert_eq!(second, secs(2));
        assert_eq!(third, secs(5));
        // Total span equals the sum of durations: no gap, no overlap.
        assert_eq!(tl.cursor(), secs(6));
    }

    #[test]
    fn late_arrival_never_schedules_in_the_past() {
        let mut tl = Timeline::new();
        tl.schedule(secs(0), secs(1));
        // Arrival after the previous buffer already finished.
        let start = tl.schedule(secs(5), secs(1));
        assert_eq!(start, secs(5));
    }

    #[test]
    fn stop_all_resets_cursor_to_now() {
        let mut tl = Timeline::new();
        tl.schedule(secs(0), secs(10));
        tl.schedule(secs(0), secs(10));
        assert_eq!(tl.cursor(), secs(20));

        let stopped = tl.stop_all(secs(3));
        assert_eq!(stopped, 2);
        assert_eq!(tl.cursor(), secs(3));

        // Audio queued right after the interrupt starts immediately,
        // never after the pre-interrupt cursor.
        let start = tl.schedule(secs(3), secs(1));
        assert_eq!(start, secs(3));
    }

    #[test]
    fn handles_retire_on_natural_completion() {
        let mut tl = Timeline::new();
        tl.schedule(secs(0), secs(2));
        tl.schedule(secs(0), secs(2));

        assert_eq!(tl.active_count(secs(1)), 2);
        assert_eq!(tl.active_count(secs(3)), 1);
        assert!(tl.is_idle(secs(4)));
    }

    #[test]
    fn idle_timeline_is_idle() {
        let mut tl = Timeline::new();
        assert!(tl.is_idle(secs(0)));
        tl.stop_all(secs(1));
        assert!(tl.is_idle(secs(1)));
    }
}
