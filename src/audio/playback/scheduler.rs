use std::collections::BTreeMap;

/// Handle of one scheduled playback chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u64);

impl ChunkId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Gapless playback timeline.
///
/// Every chunk starts at `max(cursor, now)` and pushes the cursor to its
/// end, so consecutive chunks never overlap and only leave a gap when
/// delivery lags real time. The in-flight map holds chunks that are playing
/// or waiting to play.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    next_id: u64,
    in_flight: BTreeMap<ChunkId, ScheduledChunk>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledChunk {
        let start_at = self.next_start.max(now);
        let chunk = ScheduledChunk {
            id: ChunkId(self.next_id),
            start_at,
            duration,
        };
        self.next_id += 1;
        self.next_start = start_at + duration;
        self.in_flight.insert(chunk.id, chunk);
        chunk
    }

    /// Record natural completion. Returns true when this left nothing audible.
    pub fn complete(&mut self, id: ChunkId) -> bool {
        self.in_flight.remove(&id).is_some() && self.in_flight.is_empty()
    }

    /// Move a chunk later when the output could only start it at `start_at`.
    ///
    /// The cursor follows so the next chunk still lines up behind it.
    pub fn delay_start(&mut self, id: ChunkId, start_at: f64) {
        let Some(chunk) = self.in_flight.get_mut(&id) else {
            return;
        };
        if start_at <= chunk.start_at {
            return;
        }
        chunk.start_at = start_at;
        self.next_start = self.next_start.max(chunk.end_at());
    }

    /// Clear the timeline and return the chunks the caller must hard-stop.
    pub fn interrupt(&mut self) -> Vec<ChunkId> {
        let stopped: Vec<ChunkId> = self.in_flight.keys().copied().collect();
        self.in_flight.clear();
        self.next_start = 0.0;
        stopped
    }

    pub fn cursor(&self) -> f64 {
        self.next_start
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}
