pub mod mixer;
pub mod output;
pub mod scheduler;

pub use output::{CpalOutput, TapReader};
pub use scheduler::{ChunkId, PlaybackScheduler, ScheduledChunk};

use crate::audio::{AudioError, AudioFrame};

/// Output side of a call: a clocked sink that plays chunks at given times.
pub trait AudioOutput: Send {
    /// Current playback clock in seconds.
    fn now(&self) -> f64;

    /// Start `frame` at `start_at` on the playback clock.
    ///
    /// Returns the time the frame actually starts, later than `start_at`
    /// when the clock has already passed it.
    fn play(&mut self, id: ChunkId, frame: AudioFrame, start_at: f64) -> Result<f64, AudioError>;

    /// Hard-stop a chunk whether it is sounding or still pending.
    fn stop(&mut self, id: ChunkId);

    fn close(&mut self);
}
