//! Frame-difference motion scoring
//!
//! Pure math over low-resolution frame samples. A sample is a 100×100 RGB
//! downsample of the camera frame; consecutive samples are diffed per pixel
//! and the fraction of changed pixels becomes the motion score.

use image::DynamicImage;
use image::imageops::FilterType;

/// Side length of the downsampled comparison frame
pub const SAMPLE_SIZE: u32 = 100;

/// Summed per-channel difference above which a pixel counts as changed
/// (out of a 765 maximum)
const PIXEL_DIFF_THRESHOLD: u32 = 180;

/// Score below which the scene is considered still
pub const CAUTION_THRESHOLD: f32 = 0.12;

/// Score above which motion is classified as a hazard
pub const HAZARD_THRESHOLD: f32 = 0.2;

/// Alert tier derived from the motion score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HazardTier {
    #[default]
    Quiet,
    Caution,
    Hazard,
}

/// A 100×100 RGB snapshot used for motion comparison
#[derive(Clone)]
pub struct HazardSample {
    pixels: Vec<u8>,
}

impl HazardSample {
    /// Downsample a camera frame into a comparison sample
    #[must_use]
    pub fn from_frame(frame: &DynamicImage) -> Self {
        let small = frame
            .resize_exact(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Nearest)
            .to_rgb8();
        Self {
            pixels: small.into_raw(),
        }
    }

    /// Build a sample from raw RGB bytes; must be exactly 100×100×3 long
    #[must_use]
    pub fn from_rgb(pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() == (SAMPLE_SIZE * SAMPLE_SIZE * 3) as usize {
            Some(Self { pixels })
        } else {
            None
        }
    }
}

/// Fraction of pixels in [0,1] whose summed RGB difference between the two
/// samples exceeds the noise threshold
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn motion_score(previous: &HazardSample, current: &HazardSample) -> f32 {
    let changed = previous
        .pixels
        .chunks_exact(3)
        .zip(current.pixels.chunks_exact(3))
        .filter(|(a, b)| {
            let diff: u32 = a
                .iter()
                .zip(b.iter())
                .map(|(&x, &y)| u32::from(x.abs_diff(y)))
                .sum();
            diff > PIXEL_DIFF_THRESHOLD
        })
        .count();

    changed as f32 / (SAMPLE_SIZE * SAMPLE_SIZE) as f32
}

/// Classify a motion score into an alert tier
#[must_use]
pub fn classify(score: f32) -> HazardTier {
    if score > HAZARD_THRESHOLD {
        HazardTier::Hazard
    } else if score >= CAUTION_THRESHOLD {
        HazardTier::Caution
    } else {
        HazardTier::Quiet
    }
}

/// Sonification pitch for a motion score
#[must_use]
pub fn tone_frequency(score: f32) -> f32 {
    400.0 + score * 2000.0
}

/// Sonification volume for a motion score
#[must_use]
pub fn tone_volume(score: f32) -> f32 {
    (score * 2.0).min(0.5)
}
