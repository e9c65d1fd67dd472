use std::path::Path;

use super::{CommandResult, gemini_client, guess_mime};
use crate::config::AppConfig;

pub async fn run(config: &AppConfig, file: &Path, mime: Option<&str>) -> CommandResult {
    let mime = match mime {
        Some(mime) => mime.to_string(),
        None => guess_mime(file)
            .filter(|m| m.starts_with("audio/"))
            .ok_or_else(|| format!("cannot tell the audio type of {}, pass --mime", file.display()))?
            .to_string(),
    };
    let audio = std::fs::read(file)?;
    let client = gemini_client(config)?;

    match client.transcribe_audio(&audio, &mime).await {
        Ok(text) => println!("{}", text.trim()),
        Err(e) => {
            tracing::warn!(error = %e, "transcription failed");
            eprintln!("Could not transcribe: {e}");
        }
    }
    Ok(())
}
