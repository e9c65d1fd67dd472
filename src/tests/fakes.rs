use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::audio::AudioError;
use crate::audio::capture::{FrameConsumer, FrameGate, Microphone};
use crate::audio::playback::{AudioOutput, ChunkId};
use crate::audio::AudioFrame;
use crate::error::prelude::*;
use crate::live::{
    LiveChannel, LiveConnector, OutboundMessage, ServerEvent, SessionSetup, Translator,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Played {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

#[derive(Default)]
struct ProbeState {
    calls: Vec<String>,
    played: Vec<Played>,
    stopped: Vec<ChunkId>,
    now: f64,
    late_by: f64,
    fail_play: bool,
}

/// Shared record of what the session did to its devices.
#[derive(Clone, Default)]
pub struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().calls.push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().calls.iter().filter(|c| *c == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().unwrap().calls.iter().position(|c| c == call)
    }

    pub fn played(&self) -> Vec<Played> {
        self.0.lock().unwrap().played.clone()
    }

    pub fn stopped(&self) -> Vec<ChunkId> {
        self.0.lock().unwrap().stopped.clone()
    }

    pub fn set_now(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    /// Make the output clock run `by` seconds ahead of what `now()` reported.
    pub fn start_late(&self, by: f64) {
        self.0.lock().unwrap().late_by = by;
    }

    pub fn fail_play(&self) {
        self.0.lock().unwrap().fail_play = true;
    }
}

pub struct FakeMicrophone {
    probe: Probe,
    gate: FrameGate,
    deny: bool,
}

impl FakeMicrophone {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            gate: FrameGate::new(),
            deny: false,
        }
    }

    pub fn denied(probe: Probe) -> Self {
        Self {
            deny: true,
            ..Self::new(probe)
        }
    }

    /// The gate the capture worker would push through.
    pub fn gate(&self) -> FrameGate {
        self.gate.clone()
    }
}

impl Microphone for FakeMicrophone {
    fn acquire(&mut self) -> Result<(), AudioError> {
        self.probe.record("mic.acquire");
        if self.deny {
            return Err(AudioError::NoMicrophoneFound);
        }
        Ok(())
    }

    fn subscribe(&mut self, consumer: FrameConsumer) {
        self.probe.record("mic.subscribe");
        self.gate.subscribe(consumer);
    }

    fn release(&mut self) {
        self.probe.record("mic.release");
        self.gate.close();
    }
}

pub struct FakeOutput {
    probe: Probe,
}

impl FakeOutput {
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

impl AudioOutput for FakeOutput {
    fn now(&self) -> f64 {
        self.probe.0.lock().unwrap().now
    }

    fn play(&mut self, id: ChunkId, frame: AudioFrame, start_at: f64) -> Result<f64, AudioError> {
        let mut state = self.probe.0.lock().unwrap();
        if state.fail_play {
            return Err(AudioError::DeviceThreadLost);
        }
        state.calls.push("output.play".into());
        state.played.push(Played {
            id,
            start_at,
            duration: frame.duration(),
        });
        Ok(start_at.max(state.now + state.late_by))
    }

    fn stop(&mut self, id: ChunkId) {
        let mut state = self.probe.0.lock().unwrap();
        state.calls.push("output.stop".into());
        state.stopped.push(id);
    }

    fn close(&mut self) {
        self.probe.record("output.close");
    }
}

/// The far end of a fake live channel.
pub struct Remote {
    pub events: mpsc::Sender<ServerEvent>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
}

pub struct FakeConnector {
    channel: Mutex<Option<LiveChannel>>,
    refuse: Option<String>,
    setup: Mutex<Option<SessionSetup>>,
}

impl FakeConnector {
    pub fn new() -> (Self, Remote) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let channel = LiveChannel {
            outbound: outbound_tx,
            inbound: events_rx,
            reader: None,
        };
        let connector = Self {
            channel: Mutex::new(Some(channel)),
            refuse: None,
            setup: Mutex::new(None),
        };
        let remote = Remote {
            events: events_tx,
            outbound: outbound_rx,
        };
        (connector, remote)
    }

    pub fn refusing(reason: &str) -> Self {
        Self {
            channel: Mutex::new(None),
            refuse: Some(reason.to_string()),
            setup: Mutex::new(None),
        }
    }

    pub fn setup(&self) -> Option<SessionSetup> {
        self.setup.lock().unwrap().clone()
    }
}

impl LiveConnector for FakeConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveChannel, SessionError> {
        *self.setup.lock().unwrap() = Some(setup);
        if let Some(reason) = &self.refuse {
            return Err(SessionError::Connect(reason.clone()));
        }
        self.channel
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::Connect("already connected".into()))
    }
}

#[derive(Default)]
pub struct FakeTranslator {
    calls: Mutex<Vec<String>>,
}

impl FakeTranslator {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Translator for FakeTranslator {
    async fn translate(&self, text: String) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(text.clone());
        Ok(format!("EN({text})"))
    }
}
