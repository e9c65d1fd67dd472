use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use super::playback::TapReader;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

const SMOOTHING: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Byte magnitude spectrum of the most recent playback samples.
///
/// Mirrors the usual analyser-node recipe: Blackman window, magnitude
/// normalised by the FFT size, exponential smoothing across snapshots, then
/// decibels mapped linearly from `MIN_DECIBELS..MAX_DECIBELS` onto `0..=255`.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    tap: Option<TapReader>,
    drained: Vec<f32>,
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            history: VecDeque::from(vec![0.0; FFT_SIZE]),
            smoothed: vec![0.0; BIN_COUNT],
            tap: None,
            drained: Vec::new(),
        }
    }

    /// Read playback samples from `tap` on every [`refresh`](Self::refresh).
    pub fn attach(mut self, tap: TapReader) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Append samples, keeping only the newest `FFT_SIZE`.
    pub fn feed(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(FFT_SIZE);
        for &sample in &samples[skip..] {
            if self.history.len() == FFT_SIZE {
                self.history.pop_front();
            }
            self.history.push_back(sample);
        }
    }

    /// Drain the attached tap and take a snapshot.
    pub fn refresh(&mut self) -> Vec<u8> {
        if let Some(tap) = self.tap.as_mut() {
            self.drained.clear();
            tap.drain_into(&mut self.drained);
            let drained = std::mem::take(&mut self.drained);
            self.feed(&drained);
            self.drained = drained;
        }
        self.snapshot()
    }

    pub fn snapshot(&mut self) -> Vec<u8> {
        let mut buffer: Vec<Complex<f32>> = self
            .history
            .iter()
            .zip(self.window.iter())
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        buffer
            .iter()
            .take(BIN_COUNT)
            .zip(self.smoothed.iter_mut())
            .map(|(c, smoothed)| {
                let magnitude = c.norm() / FFT_SIZE as f32;
                *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                ((db - MIN_DECIBELS) * scale).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Forget everything heard so far, including samples still in the tap.
    pub fn reset(&mut self) {
        if let Some(tap) = self.tap.as_mut() {
            self.drained.clear();
            tap.drain_into(&mut self.drained);
        }
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}
