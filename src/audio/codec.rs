//! 16-bit PCM and base64 transport encoding.
//!
//! The live channel is text oriented, so audio travels as base64 over
//! little-endian signed 16-bit samples.

use base64::{Engine as _, engine::general_purpose};

use crate::audio::frame::AudioFrame;
use crate::error::format::FormatError;

pub fn float_to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

pub fn pcm16_to_float(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Convert float samples to little-endian PCM bytes.
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(*sample).to_le_bytes());
    }
    bytes
}

/// Convert little-endian PCM bytes back to float samples.
pub fn decode_pcm(bytes: &[u8]) -> Result<Vec<f32>, FormatError> {
    if bytes.len() % 2 != 0 {
        return Err(FormatError::OddLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_float(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

pub fn encode(samples: &[f32]) -> String {
    general_purpose::STANDARD.encode(encode_pcm(samples))
}

pub fn decode(text: &str) -> Result<Vec<f32>, FormatError> {
    let bytes = general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| FormatError::Base64(e.to_string()))?;
    decode_pcm(&bytes)
}

/// Decode a transport payload into a frame at the given rate.
pub fn decode_frame(text: &str, sample_rate: u32) -> Result<AudioFrame, FormatError> {
    Ok(AudioFrame::new(decode(text)?, sample_rate))
}
