use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{CommandResult, SelectionArgs, gemini_client, lesson};
use crate::audio::capture::CpalMicrophone;
use crate::audio::playback::CpalOutput;
use crate::audio::spectrum::SpectrumAnalyser;
use crate::config::AppConfig;
use crate::console::CallPrinter;
use crate::error::prelude::*;
use crate::live::{CallCommand, CallIo, GeminiConnector, LiveSession, drive};
use crate::types::lesson::LessonContext;

pub async fn run(config: &AppConfig, lesson_file: Option<&Path>, args: &SelectionArgs) -> CommandResult {
    let plan = match lesson_file {
        Some(path) => lesson::load(path)?,
        None => lesson::fetch(config, args).await?,
    };
    let context = LessonContext::from_plan(&plan);
    println!("Lesson: {}\nScenario: {}\n", context.title, context.scenario);

    let api_key = config.api_key()?;
    let translator = Arc::new(gemini_client(config)?);
    let connector = GeminiConnector::new(config.api.live_url.clone(), api_key);

    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let (output, tap) = CpalOutput::open(config.audio.output_device.as_deref(), ended_tx)
        .map_err(|e| SessionError::Output(e.to_string()))?;
    let mic = CpalMicrophone::new(config.audio.input_device.clone(), config.live.frame_size);

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let (translations_tx, translations_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::channel(1);

    let printer = tokio::spawn(async move {
        let mut printer = CallPrinter::default();
        while let Some(update) = updates_rx.recv().await {
            printer.print(&update);
        }
    });

    let hangup = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = commands_tx.send(CallCommand::Stop).await;
        }
    });

    let mut session = LiveSession::new(
        mic,
        output,
        translator,
        config.session_config(),
        updates_tx,
        translations_tx,
    );
    let io = CallIo {
        playback_ended: ended_rx,
        translations: translations_rx,
        commands: commands_rx,
        analyser: Some(SpectrumAnalyser::new().attach(tap)),
        render_interval: config.live.render_interval(),
    };

    let result = drive(&mut session, &connector, &context, io).await;

    drop(session);
    hangup.abort();
    let _ = printer.await;

    result?;
    Ok(())
}
