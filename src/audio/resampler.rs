use crate::audio::AudioError;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Mono sample-rate converter.
///
/// Equal rates pass samples straight through without touching rubato.
pub struct Resampler {
    resampler: Option<SincFixedIn<f32>>,
    chunk_size: usize,
    pending: Vec<f32>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self, AudioError> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };

            Some(
                SincFixedIn::<f32>::new(
                    to_rate as f64 / from_rate as f64,
                    2.0, // max_resample_ratio_relative
                    params,
                    chunk_size,
                    1, // nbr_channels
                )
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?,
            )
        };

        Ok(Resampler {
            resampler,
            chunk_size,
            pending: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Streaming conversion for a continuous signal.
    ///
    /// Input is buffered until a full chunk is available; the remainder is
    /// carried into the next call so no samples are padded or lost.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);
        let mut output = Vec::new();

        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            let waves_out = resampler
                .process(&[chunk], None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
            output.extend_from_slice(&waves_out[0]);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_equal_rates_when_process_then_samples_pass_through() {
        // Given
        let mut resampler = Resampler::new(16_000, 16_000, 1024).unwrap();
        let input = vec![0.1, 0.2, 0.3];

        // When
        let output = resampler.process(&input).unwrap();

        // Then
        assert!(resampler.is_passthrough());
        assert_eq!(output, input);
    }

    #[test]
    fn given_partial_chunk_when_process_then_buffers_until_chunk_complete() {
        // Given
        let mut resampler = Resampler::new(48_000, 16_000, 1024).unwrap();

        // When
        let first = resampler.process(&vec![0.0; 1000]).unwrap();
        let second = resampler.process(&vec![0.0; 100]).unwrap();

        // Then
        assert!(first.is_empty());
        assert!(!second.is_empty());
        assert!(second.len() < 1024);
    }

    #[test]
    fn given_continuous_blocks_when_upsampled_then_output_tracks_ratio() {
        // Given
        let mut resampler = Resampler::new(24_000, 48_000, 256).unwrap();

        // When
        let mut total = 0;
        for _ in 0..10 {
            total += resampler.process(&[0.5; 256]).unwrap().len();
        }

        // Then
        assert!((5100..=5140).contains(&total));
    }
}
