use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::audio::frame::AudioFrame;

/// Bounded hand-off between the capture worker and the network sender.
///
/// `push` never blocks the capture thread. When the sender falls behind and
/// the queue is full the oldest frame is discarded, so the model always hears
/// the most recent speech. Order of the surviving frames is preserved.
pub struct FrameQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    frames: VecDeque<AudioFrame>,
    dropped: u64,
    closed: bool,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a frame. Returns true if an older frame had to be dropped.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.closed {
            return false;
        }

        state.frames.push_back(frame);
        let mut dropped = false;
        while state.frames.len() > self.capacity {
            state.frames.pop_front();
            state.dropped += 1;
            dropped = true;
        }
        drop(state);

        self.notify.notify_one();
        dropped
    }

    /// Wait for the next frame. Returns `None` once closed.
    ///
    /// Intended for a single consumer task.
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            {
                let mut state = self.state.lock().ok()?;
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue and discard anything not yet sent.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            state.frames.clear();
        }
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.frames.len()).unwrap_or(0)
    }

    pub fn dropped(&self) -> u64 {
        self.state.lock().map(|s| s.dropped).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: f32) -> AudioFrame {
        AudioFrame::new(vec![tag], 16_000)
    }

    #[tokio::test]
    async fn given_queued_frames_when_pop_then_capture_order_kept() {
        // Given
        let queue = FrameQueue::new(4);
        queue.push(frame(1.0));
        queue.push(frame(2.0));

        // When
        let first = queue.pop().await.unwrap();
        let second = queue.pop().await.unwrap();

        // Then
        assert_eq!(first.samples(), &[1.0]);
        assert_eq!(second.samples(), &[2.0]);
    }

    #[tokio::test]
    async fn given_full_queue_when_push_then_oldest_frame_dropped() {
        // Given
        let queue = FrameQueue::new(2);
        queue.push(frame(1.0));
        queue.push(frame(2.0));

        // When
        let dropped = queue.push(frame(3.0));

        // Then
        assert!(dropped);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await.unwrap().samples(), &[2.0]);
        assert_eq!(queue.pop().await.unwrap().samples(), &[3.0]);
    }

    #[tokio::test]
    async fn given_waiting_consumer_when_closed_then_pop_returns_none() {
        let queue = std::sync::Arc::new(FrameQueue::new(2));
        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.close();

        assert!(waiter.await.unwrap().is_none());
        assert!(!queue.push(frame(1.0)));
    }
}
