use std::sync::Arc;

/// Rate of microphone frames sent to the live channel.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Rate of audio chunks produced by the remote model.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// An immutable block of mono samples.
///
/// Clones share the sample buffer, so handing a frame to the codec or the
/// output engine never copies audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
