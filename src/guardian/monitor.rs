//! Hazard monitor
//!
//! Ticked at a fixed 5 Hz cadence while the guardian is active: downsample
//! the current camera frame, score it against the previous sample, drive the
//! sonifier, and publish the alert tier for the alert surface. Only the
//! immediately-previous sample is retained.

use image::DynamicImage;
use tokio::sync::watch;

use crate::guardian::motion::{
    HazardSample, HazardTier, classify, motion_score, tone_frequency, tone_volume,
};
use crate::guardian::sonifier::Sonifier;

/// Interval between hazard samples
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// Motion-based hazard detection over consecutive camera frames
pub struct HazardMonitor {
    previous: Option<HazardSample>,
    sonifier: Option<Sonifier>,
    tier_tx: watch::Sender<HazardTier>,
}

impl HazardMonitor {
    /// Create a monitor.
    ///
    /// A missing output device degrades to silent operation: the tier is
    /// still published for the alert surface, there is just no tone.
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<HazardTier>) {
        let sonifier = match Sonifier::new() {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "sonifier unavailable, hazard alerts will be silent");
                None
            }
        };

        let (tier_tx, tier_rx) = watch::channel(HazardTier::Quiet);
        (
            Self {
                previous: None,
                sonifier,
                tier_tx,
            },
            tier_rx,
        )
    }

    /// Score one camera frame against the previous sample.
    ///
    /// The first frame after a reset establishes the baseline and always
    /// reports quiet.
    pub fn tick(&mut self, frame: &DynamicImage) -> HazardTier {
        let sample = HazardSample::from_frame(frame);
        let score = self
            .previous
            .as_ref()
            .map_or(0.0, |prev| motion_score(prev, &sample));
        self.previous = Some(sample);

        let tier = classify(score);
        match tier {
            HazardTier::Quiet => {
                if let Some(sonifier) = &self.sonifier {
                    sonifier.silence();
                }
            }
            HazardTier::Caution | HazardTier::Hazard => {
                tracing::debug!(score, ?tier, "motion detected");
                if let Some(sonifier) = &self.sonifier {
                    sonifier.set_tone(tone_frequency(score), tone_volume(score));
                }
            }
        }

        self.tier_tx.send_replace(tier);
        tier
    }

    /// Drop the baseline sample and fall silent; the next tick starts fresh
    pub fn reset(&mut self) {
        self.previous = None;
        if let Some(sonifier) = &self.sonifier {
            sonifier.silence();
        }
        self.tier_tx.send_replace(HazardTier::Quiet);
    }
}
