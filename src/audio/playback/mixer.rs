use super::scheduler::ChunkId;

struct Voice {
    id: ChunkId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sample-accurate mono mixer driven by the output device clock.
///
/// `clock` counts frames rendered since the engine started; it is the
/// playback timeline that chunk start times refer to. Removing a voice takes
/// effect on the next render call, including voices already sounding.
pub struct Mixer {
    sample_rate: u32,
    clock: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current position of the timeline in seconds.
    pub fn now(&self) -> f64 {
        self.clock as f64 / self.sample_rate as f64
    }

    /// Queue `samples` at `start_at` seconds and return when they actually start.
    ///
    /// A start the clock has already passed plays from the first sample at
    /// the current clock.
    pub fn add(&mut self, id: ChunkId, samples: Vec<f32>, start_at: f64) -> f64 {
        let start_at = start_at.max(0.0);
        let requested = (start_at * self.sample_rate as f64).round() as u64;
        let start_frame = requested.max(self.clock);
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        if start_frame == requested {
            start_at
        } else {
            start_frame as f64 / self.sample_rate as f64
        }
    }

    pub fn remove(&mut self, id: ChunkId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        before != self.voices.len()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Render the next `out.len()` frames and return voices that finished.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<ChunkId> {
        out.fill(0.0);
        let window_start = self.clock;
        let window_end = window_start + out.len() as u64;

        for voice in &self.voices {
            let from = voice.start_frame.max(window_start);
            let to = voice.end_frame().min(window_end);
            for frame in from..to {
                out[(frame - window_start) as usize] +=
                    voice.samples[(frame - voice.start_frame) as usize];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.clock = window_end;

        let mut finished = Vec::new();
        self.voices.retain(|voice| {
            if voice.end_frame() <= window_end {
                finished.push(voice.id);
                false
            } else {
                true
            }
        });
        finished
    }
}
