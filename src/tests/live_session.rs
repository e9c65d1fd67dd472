use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use tokio::sync::mpsc;

use super::fakes::{FakeConnector, FakeMicrophone, FakeOutput, FakeTranslator, Probe, Remote};
use crate::audio::capture::FrameGate;
use crate::audio::{AudioFrame, codec};
use crate::error::prelude::*;
use crate::live::{
    LiveSession, OutboundMessage, ServerEvent, SessionConfig, SessionState, SessionUpdate,
    TranslationOutcome,
};
use crate::types::lesson::LessonContext;

type TestSession = LiveSession<FakeMicrophone, FakeOutput, FakeTranslator>;

fn lesson() -> LessonContext {
    LessonContext {
        title: "At the Tea House".into(),
        vocabulary: vec!["茶".into(), "杯".into()],
        scenario: "Ordering tea".into(),
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        model: "live-model".into(),
        voice: "Kore".into(),
        tutor_name: "Chen Laoshi".into(),
        translation_delay: Duration::from_millis(800),
        frame_queue_capacity: 4,
    }
}

/// Half a second of model audio.
fn half_second_chunk() -> String {
    codec::encode(&vec![0.1; 12_000])
}

struct Harness {
    session: TestSession,
    probe: Probe,
    gate: FrameGate,
    translator: Arc<FakeTranslator>,
    connector: FakeConnector,
    remote: Remote,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    translations: mpsc::UnboundedReceiver<TranslationOutcome>,
}

impl Harness {
    fn new() -> Self {
        let probe = Probe::default();
        let mic = FakeMicrophone::new(probe.clone());
        let gate = mic.gate();
        let translator = Arc::new(FakeTranslator::default());
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (translations_tx, translations) = mpsc::unbounded_channel();
        let session = LiveSession::new(
            mic,
            FakeOutput::new(probe.clone()),
            Arc::clone(&translator),
            config(),
            updates_tx,
            translations_tx,
        );
        let (connector, remote) = FakeConnector::new();
        Self {
            session,
            probe,
            gate,
            translator,
            connector,
            remote,
            updates,
            translations,
        }
    }

    async fn open() -> Self {
        let mut harness = Self::new();
        let _inbound = harness
            .session
            .start(&harness.connector, &lesson())
            .await
            .unwrap();
        harness.session.handle_event(ServerEvent::SetupComplete);
        harness
    }

    fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            updates.push(update);
        }
        updates
    }
}

#[tokio::test]
async fn given_idle_session_when_started_then_connecting_with_lesson_setup() {
    // Given
    let mut h = Harness::new();

    // When
    let inbound = h.session.start(&h.connector, &lesson()).await;

    // Then
    assert!(inbound.is_ok());
    assert_eq!(h.session.state(), SessionState::Connecting);
    assert!(!h.session.is_connected());
    assert_eq!(h.probe.count("mic.acquire"), 1);
    let setup = h.connector.setup().unwrap();
    assert_eq!(setup.voice, "Kore");
    assert_eq!(setup.model, "live-model");
    assert!(setup.system_instruction.contains("Current Lesson: At the Tea House"));
    assert!(setup.system_instruction.contains("Vocabulary: 茶, 杯"));
}

#[tokio::test]
async fn given_connecting_session_when_setup_complete_then_open_and_subscribed() {
    let h = Harness::open().await;

    assert_eq!(h.session.state(), SessionState::Open);
    assert!(h.session.is_connected());
    assert_eq!(h.probe.count("mic.subscribe"), 1);
}

#[tokio::test]
async fn given_started_session_when_started_again_then_invalid_state() {
    let mut h = Harness::open().await;

    let result = h.session.start(&h.connector, &lesson()).await;

    assert!(matches!(
        result,
        Err(SessionError::InvalidState { op: "start", state: SessionState::Open })
    ));
}

#[tokio::test]
async fn given_open_session_when_frames_captured_then_sent_in_capture_order() {
    // Given
    let mut h = Harness::open().await;

    // When
    for tag in [0.25f32, 0.5, -0.25] {
        assert!(h.gate.deliver(AudioFrame::new(vec![tag; 4], 16_000)));
    }

    // Then
    let mut firsts = Vec::new();
    for _ in 0..3 {
        let OutboundMessage::Audio(data) = h.remote.outbound.recv().await.unwrap();
        firsts.push(codec::decode(&data).unwrap()[0]);
    }
    assert_abs_diff_eq!(firsts[0], 0.25, epsilon = 1.0 / 32768.0);
    assert_abs_diff_eq!(firsts[1], 0.5, epsilon = 1.0 / 32768.0);
    assert_abs_diff_eq!(firsts[2], -0.25, epsilon = 1.0 / 32768.0);
}

#[tokio::test(start_paused = true)]
async fn given_fragments_ni_and_hao_when_quiet_for_800ms_then_one_translation_call() {
    // Given
    let mut h = Harness::open().await;

    // When
    h.session.handle_event(ServerEvent::OutputTranscript("你".into()));
    h.session.handle_event(ServerEvent::OutputTranscript("好".into()));

    // Then
    assert_eq!(h.session.transcript().text(), "你好");
    assert_eq!(h.session.transcript().pinyin(), "nǐ hǎo");

    tokio::time::sleep(Duration::from_millis(799)).await;
    assert!(h.translator.calls().is_empty());

    let outcome = h.translations.recv().await.unwrap();
    assert_eq!(h.translator.calls(), vec!["你好".to_string()]);

    h.session.on_translation(outcome);
    assert_eq!(h.session.transcript().translation(), "EN(你好)");
    assert!(
        h.drain_updates()
            .contains(&SessionUpdate::Translation("EN(你好)".into()))
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.translator.calls().len(), 1);
}

#[tokio::test]
async fn given_three_half_second_chunks_at_zero_when_received_then_back_to_back() {
    // Given
    let mut h = Harness::open().await;

    // When
    for _ in 0..3 {
        h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    }

    // Then
    let starts: Vec<f64> = h.probe.played().iter().map(|p| p.start_at).collect();
    assert_eq!(starts, vec![0.0, 0.5, 1.0]);
    assert!(h.session.is_speaking());
    assert_eq!(h.session.in_flight(), 3);
    assert_eq!(h.session.playback_cursor(), 1.5);
}

#[tokio::test]
async fn given_output_clock_moved_past_start_when_chunks_received_then_next_chunk_follows_actual_start() {
    // Given: the device renders 0.1 s between the clock read and the play call
    let mut h = Harness::open().await;
    h.probe.start_late(0.1);

    // When
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));

    // Then
    let played = h.probe.played();
    assert_eq!(played[0].start_at, 0.0);
    assert_abs_diff_eq!(played[1].start_at, 0.6, epsilon = 1e-9);
    assert_abs_diff_eq!(h.session.playback_cursor(), 1.1, epsilon = 1e-9);
    assert_eq!(h.session.in_flight(), 2);
}

#[tokio::test]
async fn given_chunk_two_playing_at_0_7_when_interrupted_then_everything_stopped() {
    // Given
    let mut h = Harness::open().await;
    for _ in 0..3 {
        h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    }
    h.session.handle_event(ServerEvent::OutputTranscript("你好".into()));
    let second = h.probe.played()[1].id;
    h.probe.set_now(0.7);
    h.drain_updates();

    // When
    h.session.handle_event(ServerEvent::Interrupted);

    // Then
    assert!(h.probe.stopped().contains(&second));
    assert_eq!(h.probe.stopped().len(), 3);
    assert_eq!(h.session.in_flight(), 0);
    assert_eq!(h.session.playback_cursor(), 0.0);
    assert!(!h.session.is_speaking());
    assert!(h.session.transcript().is_empty());
    assert!(h.drain_updates().contains(&SessionUpdate::Speaking(false)));

    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    assert_eq!(h.probe.played()[3].start_at, 0.7);
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn given_chunks_in_flight_when_all_finish_then_speaking_cleared_once() {
    // Given
    let mut h = Harness::open().await;
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    let ids: Vec<_> = h.probe.played().iter().map(|p| p.id).collect();

    // When
    h.session.on_playback_ended(ids[0]);
    let after_first = h.drain_updates();
    h.session.on_playback_ended(ids[1]);
    let after_second = h.drain_updates();

    // Then
    assert!(after_first.contains(&SessionUpdate::Speaking(true)));
    assert!(!after_first.contains(&SessionUpdate::Speaking(false)));
    assert_eq!(after_second, vec![SessionUpdate::Speaking(false)]);
}

#[tokio::test]
async fn given_malformed_audio_when_received_then_dropped_and_session_stays_open() {
    let mut h = Harness::open().await;

    h.session.handle_event(ServerEvent::Audio("AAAA".into()));
    h.session.handle_event(ServerEvent::Audio("%%not base64%%".into()));

    assert!(h.probe.played().is_empty());
    assert_eq!(h.session.state(), SessionState::Open);

    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));
    assert_eq!(h.probe.played().len(), 1);
}

#[tokio::test]
async fn given_connecting_session_when_audio_arrives_then_ignored() {
    let mut h = Harness::new();
    let _inbound = h.session.start(&h.connector, &lesson()).await.unwrap();

    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));

    assert!(h.probe.played().is_empty());
    assert_eq!(h.session.state(), SessionState::Connecting);
}

#[tokio::test]
async fn given_open_session_when_stopped_twice_then_resources_released_once() {
    // Given
    let mut h = Harness::open().await;
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));

    // When
    h.session.stop();
    h.session.stop();

    // Then
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.probe.count("mic.release"), 1);
    assert_eq!(h.probe.count("output.close"), 1);
    assert_eq!(h.probe.count("output.stop"), 1);
    assert!(h.session.error().is_none());
}

#[tokio::test]
async fn given_open_session_when_stopped_then_teardown_runs_in_order() {
    // Given
    let mut h = Harness::open().await;
    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));

    // When
    h.session.stop();

    // Then
    let release = h.probe.position("mic.release").unwrap();
    let stop = h.probe.position("output.stop").unwrap();
    let close = h.probe.position("output.close").unwrap();
    assert!(release < stop && stop < close);

    let states: Vec<SessionState> = h
        .drain_updates()
        .into_iter()
        .filter_map(|u| match u {
            SessionUpdate::State(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Open,
            SessionState::Closing,
            SessionState::Closed
        ]
    );
}

#[tokio::test]
async fn given_stopped_session_when_frame_captured_then_not_delivered_and_channel_closed() {
    let mut h = Harness::open().await;

    h.session.stop();

    assert!(!h.gate.deliver(AudioFrame::new(vec![0.5; 4], 16_000)));
    assert!(h.remote.outbound.recv().await.is_none());
}

#[tokio::test]
async fn given_channel_error_when_open_then_error_state_and_teardown_not_repeated_by_stop() {
    // Given
    let mut h = Harness::open().await;

    // When
    h.session.handle_event(ServerEvent::Error("connection reset".into()));
    h.session.stop();

    // Then
    assert_eq!(h.session.state(), SessionState::Error);
    assert_eq!(
        h.session.error(),
        Some(&SessionError::Connect("connection reset".into()))
    );
    assert_eq!(h.probe.count("mic.release"), 1);
    assert_eq!(h.probe.count("output.close"), 1);
    assert!(
        h.drain_updates()
            .contains(&SessionUpdate::Error("connection failed: connection reset".into()))
    );
}

#[tokio::test]
async fn given_peer_close_when_open_then_closed_with_teardown() {
    let mut h = Harness::open().await;

    h.session.handle_event(ServerEvent::Closed { reason: None });

    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.probe.count("mic.release"), 1);
    assert!(h.session.error().is_none());
}

#[tokio::test]
async fn given_peer_close_before_setup_when_connecting_then_connect_error() {
    let mut h = Harness::new();
    let _inbound = h.session.start(&h.connector, &lesson()).await.unwrap();

    h.session.handle_event(ServerEvent::Closed {
        reason: Some("API key not valid".into()),
    });

    assert_eq!(h.session.state(), SessionState::Error);
    assert_eq!(
        h.session.error(),
        Some(&SessionError::Connect("API key not valid".into()))
    );
}

#[tokio::test]
async fn given_denied_microphone_when_started_then_permission_error_and_cleanup() {
    // Given
    let probe = Probe::default();
    let (updates_tx, _updates) = mpsc::unbounded_channel();
    let (translations_tx, _translations) = mpsc::unbounded_channel();
    let mut session = LiveSession::new(
        FakeMicrophone::denied(probe.clone()),
        FakeOutput::new(probe.clone()),
        Arc::new(FakeTranslator::default()),
        config(),
        updates_tx,
        translations_tx,
    );
    let (connector, _remote) = FakeConnector::new();

    // When
    let result = session.start(&connector, &lesson()).await;

    // Then
    assert!(matches!(result, Err(SessionError::Permission(_))));
    assert_eq!(session.state(), SessionState::Error);
    assert!(connector.setup().is_none());
    assert_eq!(probe.count("mic.release"), 1);
    assert_eq!(probe.count("output.close"), 1);

    session.stop();
    assert_eq!(probe.count("mic.release"), 1);
}

#[tokio::test]
async fn given_refusing_connector_when_started_then_connect_error_and_mic_released() {
    let probe = Probe::default();
    let (updates_tx, _updates) = mpsc::unbounded_channel();
    let (translations_tx, _translations) = mpsc::unbounded_channel();
    let mut session = LiveSession::new(
        FakeMicrophone::new(probe.clone()),
        FakeOutput::new(probe.clone()),
        Arc::new(FakeTranslator::default()),
        config(),
        updates_tx,
        translations_tx,
    );
    let connector = FakeConnector::refusing("dns failure");

    let result = session.start(&connector, &lesson()).await;

    assert_eq!(result.err(), Some(SessionError::Connect("dns failure".into())));
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(probe.calls()[0], "mic.acquire");
    assert_eq!(probe.count("mic.release"), 1);
}

#[tokio::test]
async fn given_output_failure_when_chunk_played_then_session_errors() {
    let mut h = Harness::open().await;
    h.probe.fail_play();

    h.session.handle_event(ServerEvent::Audio(half_second_chunk()));

    assert_eq!(h.session.state(), SessionState::Error);
    assert!(matches!(h.session.error(), Some(SessionError::Output(_))));
    assert_eq!(h.probe.count("output.close"), 1);
}

#[tokio::test]
async fn given_learner_transcript_when_open_then_published() {
    let mut h = Harness::open().await;
    h.drain_updates();

    h.session.handle_event(ServerEvent::InputTranscript("我要一杯茶".into()));
    h.session.handle_event(ServerEvent::TurnComplete);

    assert_eq!(
        h.drain_updates(),
        vec![
            SessionUpdate::LearnerTranscript("我要一杯茶".into()),
            SessionUpdate::TurnComplete
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_multi_thread_runtime_when_started_and_stopped_then_devices_acquired_and_released() {
    // Given
    let mut h = Harness::new();

    // When
    let inbound = h.session.start(&h.connector, &lesson()).await;
    h.session.handle_event(ServerEvent::SetupComplete);
    h.session.stop();

    // Then
    assert!(inbound.is_ok());
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.probe.count("mic.acquire"), 1);
    assert_eq!(h.probe.count("mic.release"), 1);
    assert_eq!(h.probe.count("output.close"), 1);
}
