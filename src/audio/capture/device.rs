use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{HeapProducer, HeapRb};

use super::framer::{FrameAssembler, FrameConsumer, FrameGate};
use super::Microphone;
use crate::audio::AudioError;
use crate::audio::frame::CAPTURE_SAMPLE_RATE;
use crate::audio::resampler::Resampler;

const RESAMPLE_CHUNK: usize = 1024;
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Microphone backed by the default (or named) cpal input device.
///
/// The cpal stream lives on a dedicated worker thread: the device callback
/// only downmixes into a lock-free ring, and the worker resamples to 16 kHz,
/// assembles frames and pushes them through the [`FrameGate`].
pub struct CpalMicrophone {
    device_name: Option<String>,
    frame_size: usize,
    gate: FrameGate,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>, frame_size: usize) -> Self {
        Self {
            device_name,
            frame_size,
            gate: FrameGate::new(),
            worker: None,
        }
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&mut self) -> Result<(), AudioError> {
        if self.worker.is_some() {
            return Ok(());
        }

        self.gate = FrameGate::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let setup = CaptureSetup {
            device_name: self.device_name.clone(),
            frame_size: self.frame_size,
            gate: self.gate.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let thread = std::thread::Builder::new()
            .name("laoshi-capture".into())
            .spawn(move || run_capture(setup, ready_tx))
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { shutdown, thread });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::DeviceThreadLost)
            }
        }
    }

    fn subscribe(&mut self, consumer: FrameConsumer) {
        self.gate.subscribe(consumer);
    }

    fn release(&mut self) {
        self.gate.close();
        if let Some(worker) = self.worker.take() {
            worker.shutdown.store(true, Ordering::Release);
            if worker.thread.join().is_err() {
                tracing::warn!("capture worker panicked during shutdown");
            }
            tracing::debug!("microphone released");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}

struct CaptureSetup {
    device_name: Option<String>,
    frame_size: usize,
    gate: FrameGate,
    shutdown: Arc<AtomicBool>,
}

fn find_input_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or(AudioError::NoMicrophoneFound),
        None => host
            .default_input_device()
            .ok_or(AudioError::NoMicrophoneFound),
    }
}

/// Prefer a native 16 kHz config so no resampling is needed.
fn choose_input_config(device: &Device) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let native = device
        .supported_input_configs()
        .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
        .filter(|range| {
            range.min_sample_rate().0 <= CAPTURE_SAMPLE_RATE
                && range.max_sample_rate().0 >= CAPTURE_SAMPLE_RATE
        })
        .min_by_key(|range| range.channels())
        .map(|range| range.with_sample_rate(cpal::SampleRate(CAPTURE_SAMPLE_RATE)));

    let supported = match native {
        Some(config) => config,
        None => device
            .default_input_config()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?,
    };

    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProducer<f32>,
    overruns: Arc<AtomicUsize>,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut lost = 0;
                // Convert to mono by averaging
                for chunk in data.chunks(channels) {
                    let mono =
                        chunk.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / channels as f32;
                    if producer.push(mono).is_err() {
                        lost += 1;
                    }
                }
                if lost > 0 {
                    overruns.fetch_add(lost, Ordering::Relaxed);
                }
            },
            |err| tracing::error!(error = %err, "input stream error"),
            None,
        )
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))
}

fn open_stream(
    setup: &CaptureSetup,
    overruns: Arc<AtomicUsize>,
) -> Result<(Stream, ringbuf::HeapConsumer<f32>, u32), AudioError> {
    let device = find_input_device(setup.device_name.as_deref())?;
    let (config, format) = choose_input_config(&device)?;
    let device_rate = config.sample_rate.0;

    // Two seconds of device audio between the callback and the worker
    let ring = HeapRb::<f32>::new(device_rate as usize * 2);
    let (producer, consumer) = ring.split();

    let stream = match format {
        SampleFormat::F32 => build_input_stream::<f32>(&device, &config, producer, overruns)?,
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, producer, overruns)?,
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, producer, overruns)?,
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
        "microphone acquired"
    );

    Ok((stream, consumer, device_rate))
}

fn run_capture(setup: CaptureSetup, ready: mpsc::SyncSender<Result<(), AudioError>>) {
    let overruns = Arc::new(AtomicUsize::new(0));

    let (stream, mut consumer, device_rate) = match open_stream(&setup, Arc::clone(&overruns)) {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let mut resampler = match Resampler::new(device_rate, CAPTURE_SAMPLE_RATE, RESAMPLE_CHUNK) {
        Ok(resampler) => resampler,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut assembler = FrameAssembler::new(setup.frame_size, CAPTURE_SAMPLE_RATE);
    let mut scratch = vec![0.0f32; RESAMPLE_CHUNK * 2];
    let mut reported_overruns = 0;

    while !setup.shutdown.load(Ordering::Acquire) && setup.gate.is_live() {
        let read = consumer.pop_slice(&mut scratch);
        if read == 0 {
            std::thread::sleep(IDLE_POLL);
            continue;
        }

        let samples = match resampler.process(&scratch[..read]) {
            Ok(samples) => samples,
            Err(err) => {
                tracing::warn!(error = %err, "dropping capture block");
                continue;
            }
        };

        for frame in assembler.push(&samples) {
            if !setup.gate.deliver(frame) {
                break;
            }
        }

        let lost = overruns.load(Ordering::Relaxed);
        if lost != reported_overruns {
            tracing::warn!(samples = lost - reported_overruns, "capture ring overrun");
            reported_overruns = lost;
        }
    }

    drop(stream);
}
