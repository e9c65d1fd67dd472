use std::time::Duration;

use tokio::sync::mpsc;

use super::{CommandResult, gemini_client};
use crate::audio::codec;
use crate::audio::frame::PLAYBACK_SAMPLE_RATE;
use crate::audio::playback::{AudioOutput, CpalOutput, PlaybackScheduler};
use crate::config::AppConfig;

const DRAIN_GRACE: Duration = Duration::from_secs(2);

pub async fn run(config: &AppConfig, text: &str) -> CommandResult {
    let client = gemini_client(config)?;

    // A failed synthesis only skips this playback
    let data = match client.generate_speech(text).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis failed");
            eprintln!("Could not synthesise speech: {e}");
            return Ok(());
        }
    };
    let frame = codec::decode_frame(&data, PLAYBACK_SAMPLE_RATE)?;
    if frame.is_empty() {
        return Ok(());
    }

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let (mut output, _tap) = CpalOutput::open(config.audio.output_device.as_deref(), ended_tx)?;
    let mut scheduler = PlaybackScheduler::new();

    let duration = frame.duration();
    let chunk = scheduler.schedule(duration, output.now());
    let started_at = output.play(chunk.id, frame, chunk.start_at)?;
    let end_at = started_at + duration;

    let deadline = Duration::from_secs_f64((end_at - output.now()).max(0.0)) + DRAIN_GRACE;
    let finished = tokio::time::timeout(deadline, async {
        while let Some(id) = ended_rx.recv().await {
            if scheduler.complete(id) {
                break;
            }
        }
    })
    .await;
    if finished.is_err() {
        tracing::warn!(duration, "playback did not report completion");
    }

    output.close();
    Ok(())
}
