use std::path::Path;

use super::{CommandResult, gemini_client, guess_mime};
use crate::config::AppConfig;

pub async fn run(
    config: &AppConfig,
    task: &str,
    text: Option<&str>,
    image: Option<&Path>,
) -> CommandResult {
    let client = gemini_client(config)?;

    let feedback = match (text, image) {
        (_, Some(path)) => {
            let mime = guess_mime(path)
                .filter(|m| m.starts_with("image/"))
                .ok_or_else(|| format!("unsupported image type: {}", path.display()))?;
            let bytes = std::fs::read(path)?;
            client.analyze_handwriting(task, &bytes, mime).await
        }
        (Some(text), None) => client.check_homework(task, text).await,
        (None, None) => return Err("provide --text or --image".into()),
    };

    match feedback {
        Ok(feedback) => println!("{feedback}"),
        Err(e) => {
            tracing::warn!(error = %e, "homework feedback failed");
            eprintln!("Could not get feedback: {e}");
        }
    }
    Ok(())
}
