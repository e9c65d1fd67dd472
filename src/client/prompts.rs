use serde_json::{Value, json};

use crate::types::lesson::LessonSelection;

pub fn lesson_prompt(tutor: &str, selection: &LessonSelection) -> String {
    let day = selection.day;
    format!(
        "You are {tutor}, an expert Chinese tutor.
Generate a complete, self-contained lesson plan for:
Level: {level}
Week: {week}
Day: {day}

Adhere strictly to the curriculum progression:
- Beginner (Weeks 1-4): Basics, pinyin, numbers, daily objects.
- Intermediate (Weeks 5-8): Routines, shopping, directions, time.
- Advanced (Weeks 9-12): Opinions, comparisons, idioms, stories.

Day {day} difficulty rules:
- Day 1-2: Foundational/Moderate
- Day 3-5: Increasing vocabulary and grammar complexity
- Day 6-7: Fast-paced, advanced practice

For Flashcards:
- exampleSentence: MUST be Chinese characters ONLY. No Pinyin, No English.
- exampleMeaning: English translation of the sentence.

Return the response as a valid JSON object matching the schema.",
        level = selection.difficulty,
        week = selection.week,
    )
}

pub fn translation_prompt(text: &str) -> String {
    format!(
        "Translate this Chinese text to English. Return ONLY the English translation, concise and clear. Text: \"{text}\""
    )
}

pub fn homework_prompt(tutor: &str, task: &str, submission: &str) -> String {
    format!(
        "You are {tutor}. The student has submitted writing homework.
Task: {task}
Student Submission: \"{submission}\"

Provide feedback in the following format:
1. **Quote**: Quote their text.
2. **Errors**: Mark errors with [错误].
3. **Explanation**: Explain the reason. **(YOU MUST PROVIDE THIS EXPLANATION IN BOTH CHINESE AND ENGLISH)**.
4. **Correction**: Provide a corrected version.
5. **Practice**: Give 2 practice sentences using the corrected grammar/vocab.

Keep the tone encouraging but strict on accuracy. Ensure the English translation of the feedback is clear for a learner."
    )
}

pub fn handwriting_prompt(tutor: &str, task: &str) -> String {
    format!(
        "You are {tutor}. The student has uploaded a handwritten image for the assignment: \"{task}\".

Please provide feedback in this structure:
1. **Transcription**: Write out the Chinese characters you see in the image.
2. **Correction**: Point out any grammar, vocabulary, or stroke order mistakes if visible. **(PROVIDE EXPLANATION IN BOTH CHINESE AND ENGLISH)**
3. **Handwriting Feedback**: Comment on legibility and style. **(PROVIDE EXPLANATION IN BOTH CHINESE AND ENGLISH)**
4. **Corrected Version**: Provide the corrected text.
5. **Encouragement**: A brief positive note in Chinese with an English translation."
    )
}

pub const TRANSCRIPTION_PROMPT: &str =
    "Transcribe this Chinese audio exactly as spoken. Return only the Chinese characters.";

fn string() -> Value {
    json!({ "type": "STRING" })
}

fn string_list() -> Value {
    json!({ "type": "ARRAY", "items": string() })
}

/// Response schema that constrains lesson generation to [`LessonPlan`].
///
/// [`LessonPlan`]: crate::types::lesson::LessonPlan
pub fn lesson_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": string(),
            "warmUpQuestions": string_list(),
            "flashcards": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "word": string(),
                        "pinyin": string(),
                        "meaning": string(),
                        "tone": string(),
                        "type": string(),
                        "exampleSentence": {
                            "type": "STRING",
                            "description": "Example sentence using the word, in Chinese characters only."
                        },
                        "exampleMeaning": {
                            "type": "STRING",
                            "description": "English translation of the example sentence."
                        },
                        "pronunciationTip": string()
                    },
                    "required": ["word", "pinyin", "meaning", "tone", "type",
                                 "exampleSentence", "exampleMeaning", "pronunciationTip"]
                }
            },
            "sentenceCards": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "grammarNote": string(),
                        "example": string(),
                        "roleplayUse": string()
                    },
                    "required": ["grammarNote", "example", "roleplayUse"]
                }
            },
            "toneDrill": {
                "type": "OBJECT",
                "properties": {
                    "pair": string_list(),
                    "explanation": string()
                },
                "required": ["pair", "explanation"]
            },
            "grammarPoints": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "point": string(),
                        "explanation": string(),
                        "examples": string_list()
                    },
                    "required": ["point", "explanation", "examples"]
                }
            },
            "pronunciationGuide": string_list(),
            "roleplayScenario": string(),
            "summary": string(),
            "homework": {
                "type": "OBJECT",
                "properties": {
                    "speakingTask": string(),
                    "writingTask": string(),
                    "challenge": string()
                },
                "required": ["speakingTask", "writingTask", "challenge"]
            }
        },
        "required": ["title", "warmUpQuestions", "flashcards", "sentenceCards", "toneDrill",
                     "grammarPoints", "pronunciationGuide", "roleplayScenario", "summary", "homework"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::lesson::Difficulty;

    #[test]
    fn given_selection_when_lesson_prompt_then_level_week_and_day_included() {
        let selection = LessonSelection::new(Difficulty::Intermediate, 6, 3).unwrap();

        let prompt = lesson_prompt("Chen Laoshi", &selection);

        assert!(prompt.starts_with("You are Chen Laoshi"));
        assert!(prompt.contains("Level: Intermediate"));
        assert!(prompt.contains("Week: 6"));
        assert!(prompt.contains("Day 3 difficulty rules"));
    }

    #[test]
    fn given_schema_when_built_then_every_lesson_field_required() {
        let schema = lesson_schema();

        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 10);
        assert_eq!(schema["properties"]["flashcards"]["items"]["required"].as_array().unwrap().len(), 8);
    }
}
