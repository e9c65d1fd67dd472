use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        };
        f.write_str(name)
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!(
                "unknown level '{other}', expected beginner, intermediate or advanced"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LessonSelection {
    pub difficulty: Difficulty,
    pub week: u8,
    pub day: u8,
}

impl LessonSelection {
    pub const WEEKS: u8 = 12;
    pub const DAYS: u8 = 7;

    pub fn new(difficulty: Difficulty, week: u8, day: u8) -> Result<Self, String> {
        if !(1..=Self::WEEKS).contains(&week) {
            return Err(format!("week must be between 1 and {}", Self::WEEKS));
        }
        if !(1..=Self::DAYS).contains(&day) {
            return Err(format!("day must be between 1 and {}", Self::DAYS));
        }
        Ok(Self {
            difficulty,
            week,
            day,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub word: String,
    pub pinyin: String,
    pub meaning: String,
    pub tone: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub example_sentence: String,
    pub example_meaning: String,
    pub pronunciation_tip: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SentenceCard {
    pub grammar_note: String,
    pub example: String,
    pub roleplay_use: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToneDrill {
    pub pair: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GrammarPoint {
    pub point: String,
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    pub speaking_task: String,
    pub writing_task: String,
    pub challenge: String,
}

/// A generated lesson document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub title: String,
    #[serde(default)]
    pub warm_up_questions: Vec<String>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
    #[serde(default)]
    pub sentence_cards: Vec<SentenceCard>,
    pub tone_drill: ToneDrill,
    #[serde(default)]
    pub grammar_points: Vec<GrammarPoint>,
    #[serde(default)]
    pub pronunciation_guide: Vec<String>,
    pub roleplay_scenario: String,
    pub summary: String,
    pub homework: Homework,
}

/// What the live tutor needs to know about the lesson. Fixed for the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonContext {
    pub title: String,
    pub vocabulary: Vec<String>,
    pub scenario: String,
}

impl LessonContext {
    pub fn from_plan(plan: &LessonPlan) -> Self {
        Self {
            title: plan.title.clone(),
            vocabulary: plan.flashcards.iter().map(|f| f.word.clone()).collect(),
            scenario: plan.roleplay_scenario.clone(),
        }
    }

    pub fn system_instruction(&self, tutor: &str) -> String {
        format!(
            "You are {tutor}.\n\
             Current Lesson: {title}\n\
             Vocabulary: {vocabulary}\n\
             Scenario: {scenario}\n\
             \n\
             ROLE:\n\
             - Speak clearly.\n\
             - Correct pronunciation gently.\n\
             - Wait for the user to respond.\n\
             - If they struggle, slow down and use English hints.\n\
             - Start by introducing the roleplay scenario in simple Chinese.",
            title = self.title,
            vocabulary = self.vocabulary.join(", "),
            scenario = self.scenario,
        )
    }
}
