//! Quiz primitives: question model, generation, and answer evaluation

mod evaluator;
mod generator;

pub use evaluator::{AnswerEvaluator, EvaluatorSettings, Verdict, VerdictKind};
pub use generator::{GeneratorSettings, QuestionGenerator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question type as configured for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    FreeText,
    /// Alternates between multiple-choice and free-text questions
    Mixed,
}

impl QuestionType {
    /// Resolve the concrete kind for the question at `index` (0-based)
    pub fn resolve(&self, index: u32) -> QuestionKind {
        match self {
            Self::MultipleChoice => QuestionKind::MultipleChoice,
            Self::FreeText => QuestionKind::FreeText,
            Self::Mixed => {
                if index % 2 == 0 {
                    QuestionKind::MultipleChoice
                } else {
                    QuestionKind::FreeText
                }
            }
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MultipleChoice => "multiple choice",
            Self::FreeText => "free text",
            Self::Mixed => "mixed",
        };
        write!(f, "{}", name)
    }
}

/// Concrete kind of a generated question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    FreeText,
}

/// Question difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        };
        write!(f, "{}", name)
    }
}

/// A generated question, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    /// Chunks the prompt and answer are grounded in
    pub source_chunk_ids: Vec<i64>,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub prompt_text: String,
    /// Multiple choice: the correct option letter. Free text: the model answer.
    pub correct_answer: String,
    /// Multiple choice: all options in display order (empty otherwise)
    pub options: Vec<String>,
    /// Multiple choice: the incorrect options (empty otherwise)
    pub distractors: Vec<String>,
    /// Free text: key points a good answer covers (empty otherwise)
    pub key_points: Vec<String>,
    pub explanation: Option<String>,
    pub asked_at: DateTime<Utc>,
}

impl Question {
    /// Render the question for display, with lettered options for MC
    pub fn render(&self) -> String {
        match self.kind {
            QuestionKind::FreeText => self.prompt_text.clone(),
            QuestionKind::MultipleChoice => {
                let mut out = self.prompt_text.clone();
                for (i, option) in self.options.iter().enumerate() {
                    out.push_str(&format!("\n{}. {}", option_letter(i), option));
                }
                out
            }
        }
    }

    /// The text of the correct option (MC only)
    pub fn correct_option_text(&self) -> Option<&str> {
        letter_index(&self.correct_answer).and_then(|i| self.options.get(i).map(|s| s.as_str()))
    }
}

/// Option index to letter: 0 -> 'A'
pub fn option_letter(index: usize) -> char {
    (b'A' + (index as u8).min(25)) as char
}

/// Letter to option index: "a"/"A" -> 0
pub fn letter_index(letter: &str) -> Option<usize> {
    let trimmed = letter.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let upper = first.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Some((upper as u8 - b'A') as usize)
    } else {
        None
    }
}
