pub mod call;
pub mod homework;
pub mod lesson;
pub mod say;
pub mod transcribe;

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::client::{GeminiClient, Models};
use crate::config::AppConfig;
use crate::error::prelude::*;
use crate::types::lesson::{Difficulty, LessonSelection};

pub type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a lesson and print it
    Lesson {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Also save the lesson JSON to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Start a live voice call with the tutor
    Call {
        /// Lesson JSON saved by `lesson --out`
        #[arg(long, conflicts_with_all = ["level", "week", "day"])]
        lesson: Option<PathBuf>,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Speak a phrase with the tutor's voice
    Say { text: String },
    /// Get feedback on written homework
    Homework {
        /// The assignment the submission answers
        #[arg(long)]
        task: String,
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,
        /// Photo of handwritten work
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Transcribe a recording of spoken Chinese
    Transcribe {
        file: PathBuf,
        /// Override the MIME type guessed from the extension
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// beginner, intermediate or advanced
    #[arg(long, default_value = "beginner", value_parser = parse_difficulty)]
    pub level: Difficulty,
    #[arg(long, default_value_t = 1)]
    pub week: u8,
    #[arg(long, default_value_t = 1)]
    pub day: u8,
}

impl SelectionArgs {
    pub fn selection(&self) -> Result<LessonSelection, String> {
        LessonSelection::new(self.level, self.week, self.day)
    }
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    s.parse()
}

pub async fn run(command: Command, config: AppConfig) -> CommandResult {
    match command {
        Command::Lesson { selection, out } => lesson::run(&config, &selection, out.as_deref()).await,
        Command::Call { lesson, selection } => call::run(&config, lesson.as_deref(), &selection).await,
        Command::Say { text } => say::run(&config, &text).await,
        Command::Homework { task, text, image } => {
            homework::run(&config, &task, text.as_deref(), image.as_deref()).await
        }
        Command::Transcribe { file, mime } => transcribe::run(&config, &file, mime.as_deref()).await,
    }
}

pub fn gemini_client(config: &AppConfig) -> Result<GeminiClient, ServiceError> {
    let api_key = config.api_key()?;
    GeminiClient::new(
        &config.api.base_url,
        api_key,
        Models {
            text: config.api.text_model.clone(),
            lesson: config.api.lesson_model.clone(),
            tts: config.api.tts_model.clone(),
        },
        config.live.tutor_name.clone(),
        config.live.voice.clone(),
    )
}

/// MIME type for an upload, from its extension.
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => return None,
    };
    Some(mime)
}
