use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use super::protocol::{OutboundMessage, ServerEvent, SessionSetup};
use super::transcript::{TranscriptSync, TranslationOutcome, Translator};
use super::transport::LiveConnector;
use crate::audio::capture::{FrameQueue, Microphone};
use crate::audio::codec;
use crate::audio::frame::PLAYBACK_SAMPLE_RATE;
use crate::audio::playback::{AudioOutput, ChunkId, PlaybackScheduler};
use crate::error::prelude::*;
use crate::types::lesson::LessonContext;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Device calls wait on their worker threads; keep them off the async workers.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Changes the view layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    State(SessionState),
    Speaking(bool),
    Subtitle { text: String, pinyin: String },
    Translation(String),
    LearnerTranscript(String),
    TurnComplete,
    Spectrum(Vec<u8>),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub tutor_name: String,
    pub translation_delay: Duration,
    pub frame_queue_capacity: usize,
}

/// One live call.
///
/// Owns the microphone, the output engine and both channel directions, and
/// is the only place their lifecycle changes. All methods run on the driver
/// task; device threads and socket tasks only talk to it through channels.
pub struct LiveSession<M: Microphone, O: AudioOutput, T: Translator> {
    id: u64,
    state: SessionState,
    mic: M,
    output: O,
    scheduler: PlaybackScheduler,
    transcript: TranscriptSync<T>,
    config: SessionConfig,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    outbound: Option<mpsc::Sender<OutboundMessage>>,
    reader: Option<AbortHandle>,
    queue: Option<Arc<FrameQueue>>,
    pump: Option<JoinHandle<()>>,
    released: bool,
    error: Option<SessionError>,
}

impl<M: Microphone, O: AudioOutput, T: Translator> LiveSession<M, O, T> {
    pub fn new(
        mic: M,
        output: O,
        translator: Arc<T>,
        config: SessionConfig,
        updates: mpsc::UnboundedSender<SessionUpdate>,
        translations: mpsc::UnboundedSender<TranslationOutcome>,
    ) -> Self {
        let transcript = TranscriptSync::new(translator, config.translation_delay, translations);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Idle,
            mic,
            output,
            scheduler: PlaybackScheduler::new(),
            transcript,
            config,
            updates,
            outbound: None,
            reader: None,
            queue: None,
            pump: None,
            released: false,
            error: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn is_speaking(&self) -> bool {
        !self.scheduler.is_idle()
    }

    pub fn playback_cursor(&self) -> f64 {
        self.scheduler.cursor()
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn transcript(&self) -> &super::transcript::TranscriptBuffer {
        self.transcript.buffer()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<SessionError> {
        self.error.take()
    }

    /// Acquire the microphone and open the channel.
    ///
    /// Returns the inbound event stream; the session becomes `Open` when
    /// that stream reports `SetupComplete`.
    pub async fn start<C: LiveConnector>(
        &mut self,
        connector: &C,
        lesson: &LessonContext,
    ) -> Result<mpsc::Receiver<ServerEvent>, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                op: "start",
                state: self.state,
            });
        }
        self.transition(SessionState::Connecting);

        if let Err(e) = blocking(|| self.mic.acquire()) {
            let err = SessionError::Permission(e.to_string());
            self.fail(err.clone());
            return Err(err);
        }

        let setup = SessionSetup {
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
            system_instruction: lesson.system_instruction(&self.config.tutor_name),
        };

        match connector.connect(setup).await {
            Ok(channel) => {
                self.outbound = Some(channel.outbound);
                self.reader = channel.reader;
                Ok(channel.inbound)
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        if self.state.is_terminal() {
            tracing::trace!(session = self.id, ?event, "event after session end ignored");
            return;
        }

        match event {
            ServerEvent::SetupComplete => {
                if self.state == SessionState::Connecting {
                    self.open();
                }
            }
            ServerEvent::Closed { reason } => {
                if self.state == SessionState::Connecting {
                    let reason = reason.unwrap_or_else(|| "closed before setup completed".into());
                    self.fail(SessionError::Connect(reason));
                } else {
                    tracing::info!(session = self.id, ?reason, "live channel closed by peer");
                    self.close(SessionState::Closed);
                }
            }
            ServerEvent::Error(message) => self.fail(SessionError::Connect(message)),
            ServerEvent::GoAway => {
                tracing::info!(session = self.id, "server announced disconnect");
            }
            event if self.state != SessionState::Open => {
                tracing::debug!(session = self.id, state = %self.state, ?event, "event before open ignored");
            }
            ServerEvent::Interrupted => self.interrupt(),
            ServerEvent::OutputTranscript(fragment) => {
                self.transcript.append(&fragment);
                let buffer = self.transcript.buffer();
                let update = SessionUpdate::Subtitle {
                    text: buffer.text().to_string(),
                    pinyin: buffer.pinyin().to_string(),
                };
                self.publish(update);
            }
            ServerEvent::InputTranscript(text) => {
                tracing::debug!(session = self.id, %text, "learner transcript");
                self.publish(SessionUpdate::LearnerTranscript(text));
            }
            ServerEvent::Audio(data) => self.play_chunk(&data),
            ServerEvent::TurnComplete => self.publish(SessionUpdate::TurnComplete),
        }
    }

    /// Natural end of a playback chunk, reported by the output engine.
    pub fn on_playback_ended(&mut self, id: ChunkId) {
        if self.scheduler.complete(id) {
            self.publish(SessionUpdate::Speaking(false));
        }
    }

    pub fn on_translation(&mut self, outcome: TranslationOutcome) {
        if self.transcript.apply(outcome) {
            let translation = self.transcript.buffer().translation().to_string();
            self.publish(SessionUpdate::Translation(translation));
        }
    }

    /// User hang-up. Safe from any state and safe to repeat.
    pub fn stop(&mut self) {
        if self.state.is_terminal() {
            self.teardown();
            return;
        }
        self.close(SessionState::Closed);
    }

    pub fn publish(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::info!(session = self.id, from = %self.state, to = %next, "session state");
        self.state = next;
        self.publish(SessionUpdate::State(next));
    }

    fn open(&mut self) {
        let Some(outbound) = self.outbound.clone() else {
            self.fail(SessionError::Connect("channel opened without a sender".into()));
            return;
        };

        let queue = Arc::new(FrameQueue::new(self.config.frame_queue_capacity));

        let producer = Arc::clone(&queue);
        let session = self.id;
        self.mic.subscribe(Box::new(move |frame| {
            if producer.push(frame) {
                tracing::warn!(session, dropped = producer.dropped(), "sender behind, dropped oldest frame");
            }
        }));

        let consumer = Arc::clone(&queue);
        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = consumer.pop().await {
                let data = codec::encode(frame.samples());
                if outbound.send(OutboundMessage::Audio(data)).await.is_err() {
                    break;
                }
            }
        }));
        self.queue = Some(queue);

        self.transition(SessionState::Open);
    }

    fn play_chunk(&mut self, data: &str) {
        let frame = match codec::decode_frame(data, PLAYBACK_SAMPLE_RATE) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(session = self.id, error = %e, "dropping malformed audio chunk");
                return;
            }
        };
        if frame.is_empty() {
            return;
        }

        let was_idle = self.scheduler.is_idle();
        let chunk = self.scheduler.schedule(frame.duration(), self.output.now());
        tracing::trace!(
            session = self.id,
            chunk = chunk.id.value(),
            start_at = chunk.start_at,
            duration = chunk.duration,
            "scheduled chunk"
        );

        match self.output.play(chunk.id, frame, chunk.start_at) {
            Ok(started_at) => self.scheduler.delay_start(chunk.id, started_at),
            Err(e) => {
                self.fail(SessionError::Output(e.to_string()));
                return;
            }
        }
        if was_idle {
            self.publish(SessionUpdate::Speaking(true));
        }
    }

    fn interrupt(&mut self) {
        let stopped = self.scheduler.interrupt();
        tracing::debug!(session = self.id, stopped = stopped.len(), "interrupted");
        for id in &stopped {
            self.output.stop(*id);
        }
        self.transcript.clear();

        self.publish(SessionUpdate::Subtitle {
            text: String::new(),
            pinyin: String::new(),
        });
        self.publish(SessionUpdate::Translation(String::new()));
        if !stopped.is_empty() {
            self.publish(SessionUpdate::Speaking(false));
        }
    }

    fn close(&mut self, next: SessionState) {
        if self.state == SessionState::Open || self.state == SessionState::Connecting {
            self.transition(SessionState::Closing);
        }
        self.teardown();
        self.transition(next);
    }

    fn fail(&mut self, err: SessionError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::error!(session = self.id, error = %err, "session failed");
        self.teardown();
        self.publish(SessionUpdate::Error(err.to_string()));
        self.error = Some(err);
        self.transition(SessionState::Error);
    }

    /// Release everything the session holds, exactly once.
    fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        blocking(|| self.mic.release());

        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        let stopped = self.scheduler.interrupt();
        for id in &stopped {
            self.output.stop(*id);
        }
        blocking(|| self.output.close());

        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        self.transcript.clear();
        if !stopped.is_empty() {
            self.publish(SessionUpdate::Speaking(false));
        }
        tracing::debug!(session = self.id, "session resources released");
    }
}

impl<M: Microphone, O: AudioOutput, T: Translator> Drop for LiveSession<M, O, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
