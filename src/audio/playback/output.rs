use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tokio::sync::mpsc::UnboundedSender;

use super::AudioOutput;
use super::mixer::Mixer;
use super::scheduler::ChunkId;
use crate::audio::AudioError;
use crate::audio::frame::{AudioFrame, PLAYBACK_SAMPLE_RATE};
use crate::audio::resampler::Resampler;

const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Mix frames rendered per resampler step when the device is not at 24 kHz.
const MIX_BLOCK: usize = 256;

/// Read side of the non-destructive tap on the mixed output signal.
pub struct TapReader {
    consumer: HeapConsumer<f32>,
    sample_rate: u32,
}

impl TapReader {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Move everything currently buffered into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) {
        out.extend(self.consumer.pop_iter());
    }
}

/// Pulls the 24 kHz mix into device-rate buffers.
///
/// The mix is resampled as one continuous signal, so chunk seams stay
/// sample-exact whatever rate the device runs at.
pub struct DeviceRenderer {
    mixer: Arc<Mutex<Mixer>>,
    resampler: Resampler,
    block: Vec<f32>,
    ready: VecDeque<f32>,
}

impl DeviceRenderer {
    pub fn new(mixer: Arc<Mutex<Mixer>>, device_rate: u32) -> Result<Self, AudioError> {
        let mix_rate = mixer
            .lock()
            .map(|m| m.sample_rate())
            .map_err(|_| AudioError::DeviceThreadLost)?;
        Ok(Self {
            mixer,
            resampler: Resampler::new(mix_rate, device_rate, MIX_BLOCK)?,
            block: vec![0.0; MIX_BLOCK],
            ready: VecDeque::new(),
        })
    }

    /// Fill `out` with the next device frames and return chunks that finished.
    pub fn fill(&mut self, out: &mut [f32]) -> Vec<ChunkId> {
        let Ok(mut mixer) = self.mixer.lock() else {
            out.fill(0.0);
            return Vec::new();
        };
        if self.resampler.is_passthrough() {
            return mixer.render(out);
        }

        let mut finished = Vec::new();
        while self.ready.len() < out.len() {
            finished.extend(mixer.render(&mut self.block));
            match self.resampler.process(&self.block) {
                Ok(samples) => self.ready.extend(samples),
                Err(e) => {
                    tracing::error!(error = %e, "output resampling failed");
                    out.fill(0.0);
                    return finished;
                }
            }
        }

        let n = out.len();
        for (slot, sample) in out.iter_mut().zip(self.ready.drain(..n)) {
            *slot = sample;
        }
        finished
    }
}

/// cpal-backed output engine.
///
/// The device stream is owned by a worker thread; the audio callback renders
/// the shared [`Mixer`], reports finished chunks over `ended` and copies the
/// mix into the tap ring without ever waiting on it.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    pub fn open(
        device_name: Option<&str>,
        ended: UnboundedSender<ChunkId>,
    ) -> Result<(Self, TapReader), AudioError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let name = device_name.map(str::to_string);
        let worker_shutdown = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("laoshi-playback".into())
            .spawn(move || run_output(name, ended, worker_shutdown, ready_tx))
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        let (mixer, tap) = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::DeviceThreadLost);
            }
        };

        Ok((
            Self {
                mixer,
                shutdown,
                thread: Some(thread),
            },
            tap,
        ))
    }
}

impl AudioOutput for CpalOutput {
    fn now(&self) -> f64 {
        self.mixer.lock().map(|m| m.now()).unwrap_or(0.0)
    }

    fn play(&mut self, id: ChunkId, frame: AudioFrame, start_at: f64) -> Result<f64, AudioError> {
        if self.thread.is_none() {
            return Err(AudioError::DeviceThreadLost);
        }

        let mut mixer = self.mixer.lock().map_err(|_| AudioError::DeviceThreadLost)?;
        if frame.sample_rate() != mixer.sample_rate() {
            return Err(AudioError::RateMismatch {
                expected: mixer.sample_rate(),
                actual: frame.sample_rate(),
            });
        }
        Ok(mixer.add(id, frame.samples().to_vec(), start_at))
    }

    fn stop(&mut self, id: ChunkId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.remove(id);
        }
    }

    fn close(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
        if let Some(thread) = self.thread.take() {
            self.shutdown.store(true, Ordering::Release);
            if thread.join().is_err() {
                tracing::warn!("playback worker panicked during shutdown");
            }
            tracing::debug!("audio output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn find_output_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or(AudioError::NoOutputDevice),
        None => host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice),
    }
}

/// Prefer a native 24 kHz config so model audio plays without resampling.
fn choose_output_config(device: &Device) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let native = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
        .filter(|range| {
            range.min_sample_rate().0 <= PLAYBACK_SAMPLE_RATE
                && range.max_sample_rate().0 >= PLAYBACK_SAMPLE_RATE
        })
        .min_by_key(|range| range.channels())
        .map(|range| range.with_sample_rate(cpal::SampleRate(PLAYBACK_SAMPLE_RATE)));

    let supported = match native {
        Some(config) => config,
        None => device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?,
    };

    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: DeviceRenderer,
    mut tap: HeapProducer<f32>,
    ended: UnboundedSender<ChunkId>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mono = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);

                let finished = renderer.fill(&mut mono);

                for (frame, value) in data.chunks_mut(channels).zip(mono.iter()) {
                    for slot in frame.iter_mut() {
                        *slot = value.to_sample::<T>();
                    }
                }

                // Tap never waits; a full ring just misses this buffer
                tap.push_slice(&mono);

                for id in finished {
                    let _ = ended.send(id);
                }
            },
            |err| tracing::error!(error = %err, "output stream error"),
            None,
        )
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))
}

type Opened = (Arc<Mutex<Mixer>>, TapReader);

fn open_stream(
    name: Option<&str>,
    ended: UnboundedSender<ChunkId>,
) -> Result<(Stream, Opened), AudioError> {
    let device = find_output_device(name)?;
    let (config, format) = choose_output_config(&device)?;
    let device_rate = config.sample_rate.0;

    let mixer = Arc::new(Mutex::new(Mixer::new(PLAYBACK_SAMPLE_RATE)));
    let (tap_producer, tap_consumer) = HeapRb::<f32>::new(device_rate as usize).split();
    let renderer = DeviceRenderer::new(Arc::clone(&mixer), device_rate)?;

    let stream = match format {
        SampleFormat::F32 => {
            build_output_stream::<f32>(&device, &config, renderer, tap_producer, ended)?
        }
        SampleFormat::I16 => {
            build_output_stream::<i16>(&device, &config, renderer, tap_producer, ended)?
        }
        SampleFormat::U16 => {
            build_output_stream::<u16>(&device, &config, renderer, tap_producer, ended)?
        }
        other => {
            return Err(AudioError::DeviceInitFailed(format!(
                "unsupported sample format {other:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        rate = device_rate,
        channels = config.channels,
        "audio output opened"
    );

    let tap = TapReader {
        consumer: tap_consumer,
        sample_rate: device_rate,
    };
    Ok((stream, (mixer, tap)))
}

fn run_output(
    name: Option<String>,
    ended: UnboundedSender<ChunkId>,
    shutdown: Arc<AtomicBool>,
    ready: mpsc::SyncSender<Result<Opened, AudioError>>,
) {
    let stream = match open_stream(name.as_deref(), ended) {
        Ok((stream, opened)) => {
            if ready.send(Ok(opened)).is_err() {
                return;
            }
            stream
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(SHUTDOWN_POLL);
    }

    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::scheduler::PlaybackScheduler;

    fn render_all(
        renderer: &mut DeviceRenderer,
        frames: usize,
        buffer: usize,
    ) -> (Vec<f32>, Vec<ChunkId>) {
        let mut signal = Vec::with_capacity(frames);
        let mut finished = Vec::new();
        let mut out = vec![0.0; buffer];
        while signal.len() < frames {
            finished.extend(renderer.fill(&mut out));
            signal.extend_from_slice(&out);
        }
        (signal, finished)
    }

    #[test]
    fn given_back_to_back_chunks_on_48k_device_when_rendered_then_seam_has_no_gap() {
        // Given: two 160 ms chunks queued at the same time
        let mixer = Arc::new(Mutex::new(Mixer::new(PLAYBACK_SAMPLE_RATE)));
        let mut renderer = DeviceRenderer::new(Arc::clone(&mixer), 48_000).unwrap();
        let mut scheduler = PlaybackScheduler::new();
        for _ in 0..2 {
            let chunk = scheduler.schedule(0.16, 0.0);
            mixer
                .lock()
                .unwrap()
                .add(chunk.id, vec![0.5; 3840], chunk.start_at);
        }

        // When
        let (signal, finished) = render_all(&mut renderer, 24_000, 480);

        // Then: one unbroken run covering both chunks at twice the rate
        let first = signal.iter().position(|s| *s > 0.25).unwrap();
        let last = signal.iter().rposition(|s| *s > 0.25).unwrap();
        assert!(signal[first..=last].iter().all(|s| *s > 0.25));
        let sounding = last - first + 1;
        assert!((15_352..=15_368).contains(&sounding));
        assert_eq!(finished.len(), 2);
    }

    #[test]
    fn given_24k_device_when_rendered_then_mix_passes_straight_through() {
        let mixer = Arc::new(Mutex::new(Mixer::new(PLAYBACK_SAMPLE_RATE)));
        let mut renderer = DeviceRenderer::new(Arc::clone(&mixer), PLAYBACK_SAMPLE_RATE).unwrap();
        let mut scheduler = PlaybackScheduler::new();
        let chunk = scheduler.schedule(0.0002, 0.0);
        mixer
            .lock()
            .unwrap()
            .add(chunk.id, vec![0.1, 0.2, 0.3, 0.4], chunk.start_at);

        let mut out = vec![0.0; 6];
        let finished = renderer.fill(&mut out);

        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4, 0.0, 0.0]);
        assert_eq!(finished, vec![chunk.id]);
    }
}
