use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::protocol::ServerEvent;
use super::session::{LiveSession, SessionState, SessionUpdate};
use super::transcript::{TranslationOutcome, Translator};
use super::transport::LiveConnector;
use crate::audio::capture::Microphone;
use crate::audio::playback::{AudioOutput, ChunkId};
use crate::audio::spectrum::SpectrumAnalyser;
use crate::error::prelude::*;
use crate::types::lesson::LessonContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    Stop,
}

/// Everything the driver listens to besides the socket.
pub struct CallIo {
    pub playback_ended: mpsc::UnboundedReceiver<ChunkId>,
    pub translations: mpsc::UnboundedReceiver<TranslationOutcome>,
    pub commands: mpsc::Receiver<CallCommand>,
    pub analyser: Option<SpectrumAnalyser>,
    pub render_interval: Duration,
}

/// Run one call to completion on the current task.
///
/// Every session mutation happens here, one event at a time. Render ticks
/// only fire while the session is open.
pub async fn drive<M, O, T, C>(
    session: &mut LiveSession<M, O, T>,
    connector: &C,
    lesson: &LessonContext,
    mut io: CallIo,
) -> Result<(), SessionError>
where
    M: Microphone,
    O: AudioOutput,
    T: Translator,
    C: LiveConnector,
{
    let mut inbound = match session.start(connector, lesson).await {
        Ok(inbound) => inbound,
        Err(err) => {
            session.stop();
            return Err(err);
        }
    };

    let mut ticker = tokio::time::interval(io.render_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !session.state().is_terminal() {
        tokio::select! {
            event = inbound.recv() => {
                let event = event.unwrap_or(ServerEvent::Closed { reason: None });
                let interrupted = event == ServerEvent::Interrupted;
                session.handle_event(event);
                if interrupted {
                    if let Some(analyser) = io.analyser.as_mut() {
                        analyser.reset();
                    }
                }
            }
            Some(id) = io.playback_ended.recv() => session.on_playback_ended(id),
            Some(outcome) = io.translations.recv() => session.on_translation(outcome),
            command = io.commands.recv() => match command {
                Some(CallCommand::Stop) | None => {
                    tracing::info!(session = session.id(), "call ended by user");
                    session.stop();
                }
            },
            _ = ticker.tick(), if session.state() == SessionState::Open && io.analyser.is_some() => {
                if let Some(analyser) = io.analyser.as_mut() {
                    session.publish(SessionUpdate::Spectrum(analyser.refresh()));
                }
            }
        }
    }

    session.stop();
    match session.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
