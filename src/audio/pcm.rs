//! PCM wire codec
//!
//! The live endpoint speaks raw signed 16-bit little-endian PCM. Outbound
//! audio is captured as f32 and quantized here; inbound audio is dequantized
//! back to f32 for the playback scheduler.

/// Quantize f32 samples to the 16-bit wire format.
///
/// Each sample is clamped to [-1.0, 1.0], then scaled by 0x8000 when negative
/// and 0x7FFF otherwise so that both full-scale extremes survive the
/// truncation to i16.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let quantized = if s < 0.0 {
            (s * f32::from(i16::MIN).abs()) as i16
        } else {
            (s * f32::from(i16::MAX)) as i16
        };
        out.extend_from_slice(&quantized.to_le_bytes());
    }
    out
}

/// Dequantize 16-bit little-endian wire bytes to f32 samples.
///
/// A trailing odd byte (torn frame) is ignored.
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}
