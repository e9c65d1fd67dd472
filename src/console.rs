//! Plain-text rendering of lessons and call updates on stdout.

use std::io::Write;

use crate::live::{SessionState, SessionUpdate};
use crate::types::lesson::LessonPlan;

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPECTRUM_COLUMNS: usize = 32;

/// Collapse a byte spectrum into a row of block characters.
pub fn spectrum_bar(bins: &[u8], columns: usize) -> String {
    if bins.is_empty() || columns == 0 {
        return String::new();
    }
    let per_column = bins.len().div_ceil(columns);
    bins.chunks(per_column)
        .map(|chunk| {
            let peak = chunk.iter().copied().max().unwrap_or(0) as usize;
            BARS[peak * (BARS.len() - 1) / 255]
        })
        .collect()
}

pub fn format_update(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::State(state) => Some(match state {
            SessionState::Connecting => "Connecting to your tutor...".to_string(),
            SessionState::Open => "Connected. Start speaking (Ctrl-C to hang up).".to_string(),
            SessionState::Closed => "Call ended.".to_string(),
            other => format!("[{other}]"),
        }),
        SessionUpdate::Speaking(true) => Some("(tutor speaking)".to_string()),
        SessionUpdate::Speaking(false) => None,
        SessionUpdate::Subtitle { text, pinyin } if !text.is_empty() => {
            Some(format!("老师: {text}\n      {pinyin}"))
        }
        SessionUpdate::Subtitle { .. } => None,
        SessionUpdate::Translation(text) if !text.is_empty() => Some(format!("  EN: {text}")),
        SessionUpdate::Translation(_) => None,
        SessionUpdate::LearnerTranscript(text) => Some(format!("You: {text}")),
        SessionUpdate::TurnComplete => Some(String::new()),
        SessionUpdate::Spectrum(_) => None,
        SessionUpdate::Error(message) => Some(format!("Error: {message}")),
    }
}

/// Prints updates line by line; the spectrum redraws in place on its own line.
#[derive(Default)]
pub struct CallPrinter {
    spectrum_visible: bool,
}

impl CallPrinter {
    pub fn print(&mut self, update: &SessionUpdate) {
        let mut out = std::io::stdout().lock();

        if let SessionUpdate::Spectrum(bins) = update {
            let _ = write!(out, "\r{}", spectrum_bar(bins, SPECTRUM_COLUMNS));
            let _ = out.flush();
            self.spectrum_visible = true;
            return;
        }

        if let Some(line) = format_update(update) {
            if self.spectrum_visible {
                let _ = write!(out, "\r{}\r", " ".repeat(SPECTRUM_COLUMNS));
                self.spectrum_visible = false;
            }
            let _ = writeln!(out, "{line}");
        }
    }
}

pub fn print_lesson(plan: &LessonPlan) {
    println!("== {} ==", plan.title);
    println!("{}\n", plan.summary);

    if !plan.warm_up_questions.is_empty() {
        println!("Warm-up:");
        for q in &plan.warm_up_questions {
            println!("  - {q}");
        }
        println!();
    }

    println!("Vocabulary:");
    for card in &plan.flashcards {
        println!("  {}  {}  {} ({})", card.word, card.pinyin, card.meaning, card.kind);
        println!("      {}  {}", card.example_sentence, card.example_meaning);
    }

    if !plan.grammar_points.is_empty() {
        println!("\nGrammar:");
        for point in &plan.grammar_points {
            println!("  {}: {}", point.point, point.explanation);
            for example in &point.examples {
                println!("      {example}");
            }
        }
    }

    println!(
        "\nTone drill: {}  {}",
        plan.tone_drill.pair.join(" / "),
        plan.tone_drill.explanation
    );
    println!("\nRoleplay: {}", plan.roleplay_scenario);
    println!("\nHomework:");
    println!("  Speaking:  {}", plan.homework.speaking_task);
    println!("  Writing:   {}", plan.homework.writing_task);
    println!("  Challenge: {}", plan.homework.challenge);
}
