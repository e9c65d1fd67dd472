use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pinyin::ToPinyin;
use tokio::sync::mpsc;

use super::timer::{TimerHandle, schedule_after};
use crate::error::prelude::*;

/// Single-shot Chinese to English translation.
pub trait Translator: Send + Sync + 'static {
    fn translate(&self, text: String)
    -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// What the tutor has said so far in the current utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    text: String,
    pinyin: String,
    translation: String,
}

impl TranscriptBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pinyin(&self) -> &str {
        &self.pinyin
    }

    pub fn translation(&self) -> &str {
        &self.translation
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Tone-marked pinyin for `text`, one syllable per character.
///
/// Anything that is not a Chinese character is passed through as its own
/// token, so `"我是Tom"` becomes `"wǒ shì Tom"`.
pub fn annotate(text: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut other = String::new();

    for ch in text.chars() {
        match ch.to_pinyin() {
            Some(syllable) => {
                flush(&mut other, &mut tokens);
                tokens.push(syllable.with_tone().to_string());
            }
            None => other.push(ch),
        }
    }
    flush(&mut other, &mut tokens);

    tokens.join(" ")
}

fn flush(other: &mut String, tokens: &mut Vec<String>) {
    let trimmed = other.trim();
    if !trimmed.is_empty() {
        tokens.push(trimmed.to_string());
    }
    other.clear();
}

/// Result of one debounced translation call.
#[derive(Debug)]
pub struct TranslationOutcome {
    pub generation: u64,
    pub result: Result<String, ServiceError>,
}

/// Keeps the transcript, its pinyin and its translation consistent.
///
/// Every mutation bumps the generation and restarts the quiet-period timer;
/// the timer task performs the translation call, so replacing it also
/// abandons a call that is already running. Outcomes come back through a
/// channel and are only applied if they still match the current generation.
pub struct TranscriptSync<T: Translator> {
    translator: Arc<T>,
    delay: Duration,
    outcomes: mpsc::UnboundedSender<TranslationOutcome>,
    buffer: TranscriptBuffer,
    generation: u64,
    pending: Option<TimerHandle>,
}

impl<T: Translator> TranscriptSync<T> {
    pub fn new(
        translator: Arc<T>,
        delay: Duration,
        outcomes: mpsc::UnboundedSender<TranslationOutcome>,
    ) -> Self {
        Self {
            translator,
            delay,
            outcomes,
            buffer: TranscriptBuffer::default(),
            generation: 0,
            pending: None,
        }
    }

    pub fn buffer(&self) -> &TranscriptBuffer {
        &self.buffer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn append(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.buffer.text.push_str(fragment);
        self.buffer.pinyin = annotate(&self.buffer.text);
        self.restart();
    }

    /// Forget the utterance, including any pending translation.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.buffer = TranscriptBuffer::default();
    }

    /// Apply a translation outcome. Returns true if the displayed
    /// translation changed.
    pub fn apply(&mut self, outcome: TranslationOutcome) -> bool {
        if outcome.generation != self.generation {
            tracing::trace!(generation = outcome.generation, "discarding stale translation");
            return false;
        }
        self.pending = None;

        match outcome.result {
            Ok(translation) => {
                let translation = translation.trim().to_string();
                if translation == self.buffer.translation {
                    return false;
                }
                self.buffer.translation = translation;
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "translation failed, keeping previous");
                false
            }
        }
    }

    fn restart(&mut self) {
        self.generation += 1;
        self.pending = None;

        let text = self.buffer.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let generation = self.generation;
        let translator = Arc::clone(&self.translator);
        let outcomes = self.outcomes.clone();
        self.pending = Some(schedule_after(self.delay, async move {
            let result = translator.translate(text).await;
            let _ = outcomes.send(TranslationOutcome { generation, result });
        }));
    }
}
