use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::frame::AudioFrame;

/// Push-based frame consumer installed when the live channel opens.
pub type FrameConsumer = Box<dyn FnMut(AudioFrame) + Send>;

/// Slices a continuous signal into fixed-size frames.
pub struct FrameAssembler {
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            sample_rate,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples and return every frame completed by them, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(AudioFrame::new(block, self.sample_rate));
            }
        }

        frames
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Liveness-guarded hand-off between the capture worker and the consumer.
///
/// The consumer runs under the gate lock, and `close` takes the same lock
/// after dropping the liveness flag, so once `close` returns no frame is
/// being delivered and none will be.
#[derive(Clone)]
pub struct FrameGate {
    live: Arc<AtomicBool>,
    consumer: Arc<Mutex<Option<FrameConsumer>>>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
            consumer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, consumer: FrameConsumer) {
        if !self.is_live() {
            return;
        }
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = Some(consumer);
        }
    }

    /// Hand a frame to the consumer. Returns false once the gate is closed.
    ///
    /// Frames produced before anyone subscribes are discarded.
    pub fn deliver(&self, frame: AudioFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        let Ok(mut slot) = self.consumer.lock() else {
            return false;
        };
        if !self.is_live() {
            return false;
        }
        if let Some(consumer) = slot.as_mut() {
            consumer(frame);
        }
        true
    }

    /// Stop delivery for good and drop the consumer.
    pub fn close(&self) {
        self.live.store(false, Ordering::Release);
        if let Ok(mut slot) = self.consumer.lock() {
            slot.take();
        }
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new()
    }
}
