//! Answer evaluation
//!
//! Multiple-choice answers are judged locally by normalized matching against
//! the option letter or text. Free-text answers are judged by the generation
//! service; a verdict that cannot be parsed is downgraded to "manual review"
//! rather than silently counted as wrong on content grounds.

use crate::llm::{generate_with_retry, GenerationClient, GenerationError, GenerationRequest};
use crate::quiz::{letter_index, option_letter, Question, QuestionKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Evaluation knobs copied out of the llm section of the config
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Kept low so repeated evaluations stay consistent
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_backoff: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&crate::config::LlmConfig> for EvaluatorSettings {
    fn from(config: &crate::config::LlmConfig) -> Self {
        Self {
            temperature: config.eval_temperature,
            max_tokens: config.max_tokens,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Terminal outcome of evaluating one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    Correct,
    Incorrect,
    /// The judge's reply was ambiguous; scored as incorrect but flagged so
    /// the user knows the grader, not the answer, fell short
    ManualReview,
}

/// Evaluation result for one answer
#[derive(Debug, Clone)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub feedback: String,
    pub score_delta: u32,
}

impl Verdict {
    fn correct(feedback: String) -> Self {
        Self {
            kind: VerdictKind::Correct,
            feedback,
            score_delta: 1,
        }
    }

    fn incorrect(feedback: String) -> Self {
        Self {
            kind: VerdictKind::Incorrect,
            feedback,
            score_delta: 0,
        }
    }

    fn manual_review(feedback: String) -> Self {
        Self {
            kind: VerdictKind::ManualReview,
            feedback,
            score_delta: 0,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.kind == VerdictKind::Correct
    }
}

/// Evaluates user answers against a question's reference answer
pub struct AnswerEvaluator {
    client: Arc<dyn GenerationClient>,
    settings: EvaluatorSettings,
}

impl AnswerEvaluator {
    pub fn new(client: Arc<dyn GenerationClient>, settings: EvaluatorSettings) -> Self {
        Self { client, settings }
    }

    /// Evaluate an answer, producing a terminal verdict
    pub async fn evaluate(
        &self,
        question: &Question,
        user_answer: &str,
    ) -> Result<Verdict, GenerationError> {
        match question.kind {
            QuestionKind::MultipleChoice => Ok(evaluate_multiple_choice(question, user_answer)),
            QuestionKind::FreeText => self.evaluate_free_text(question, user_answer).await,
        }
    }

    async fn evaluate_free_text(
        &self,
        question: &Question,
        user_answer: &str,
    ) -> Result<Verdict, GenerationError> {
        let prompt = evaluation_prompt(question, user_answer);
        let request =
            GenerationRequest::new(prompt, self.settings.max_tokens, self.settings.temperature);

        let response =
            generate_with_retry(self.client.as_ref(), request, self.settings.retry_backoff).await?;

        Ok(parse_free_text_verdict(&response.text, question))
    }
}

fn evaluate_multiple_choice(question: &Question, user_answer: &str) -> Verdict {
    let normalized = user_answer.trim().to_lowercase();
    let correct_idx = letter_index(&question.correct_answer).unwrap_or(0);
    let correct_text = question
        .options
        .get(correct_idx)
        .map(|s| s.as_str())
        .unwrap_or_default();
    let correct_letter = option_letter(correct_idx);

    let selected = if normalized.chars().count() == 1 {
        letter_index(&normalized).filter(|idx| *idx < question.options.len())
    } else {
        // Full-text answers map back to their option
        question
            .options
            .iter()
            .position(|o| o.trim().to_lowercase() == normalized)
            .or_else(|| {
                question
                    .options
                    .iter()
                    .position(|o| o.to_lowercase().contains(&normalized))
            })
    };

    match selected {
        Some(idx) if idx == correct_idx => {
            let mut feedback = format!("Correct! {} is the right answer.", correct_text);
            if let Some(explanation) = &question.explanation {
                feedback.push_str(&format!(" {}", explanation));
            }
            Verdict::correct(feedback)
        }
        Some(idx) => {
            let chosen = question
                .options
                .get(idx)
                .map(|s| s.as_str())
                .unwrap_or_default();
            let mut feedback = format!(
                "Not quite: you chose {}. The correct answer is {}: {}.",
                chosen, correct_letter, correct_text
            );
            if let Some(explanation) = &question.explanation {
                feedback.push_str(&format!(" {}", explanation));
            }
            Verdict::incorrect(feedback)
        }
        None => Verdict::incorrect(format!(
            "I couldn't match that to one of the options. The correct answer was {}: {}.",
            correct_letter, correct_text
        )),
    }
}

fn evaluation_prompt(question: &Question, user_answer: &str) -> String {
    let key_points = if question.key_points.is_empty() {
        String::new()
    } else {
        format!(
            "\nKey points a good answer covers:\n{}",
            question
                .key_points
                .iter()
                .map(|p| format!("- {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    format!(
        "You are an expert educational evaluator. Assess this student answer fairly.\n\n\
         Question: {question}\n\n\
         Reference answer: {reference}\n{key_points}\n\
         Student's answer: {student}\n\n\
         Judge whether the student's answer is correct in substance, then respond with valid \
         JSON only, starting with '{{' and ending with '}}'. Address the student directly in \
         the feedback and keep it concise.\n\n\
         JSON format:\n\
         {{\"is_correct\": true or false, \"feedback\": \"...\"}}",
        question = question.prompt_text,
        reference = question.correct_answer,
        key_points = key_points,
        student = user_answer,
    )
}

/// Parse the judge's reply; anything ambiguous becomes a manual-review verdict
fn parse_free_text_verdict(text: &str, question: &Question) -> Verdict {
    let manual = |question: &Question| {
        Verdict::manual_review(format!(
            "I couldn't reliably judge this answer automatically, so I'm flagging it for \
             manual review; it is not counted as correct, but that reflects the grader, \
             not necessarily your answer. For reference, a model answer is: {}",
            question.correct_answer
        ))
    };

    let json = match crate::quiz::generator::extract_json_object(text) {
        Some(json) => json,
        None => return manual(question),
    };

    let value: Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(_) => return manual(question),
    };

    let is_correct = match &value["is_correct"] {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "correct" => Some(true),
            "false" | "no" | "incorrect" => Some(false),
            _ => None,
        },
        _ => None,
    };

    let feedback = value["feedback"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match is_correct {
        Some(true) => Verdict::correct(
            feedback.unwrap_or_else(|| "Correct! Your answer covers the key points.".to_string()),
        ),
        Some(false) => Verdict::incorrect(feedback.unwrap_or_else(|| {
            format!(
                "Not quite. A model answer is: {}",
                question.correct_answer
            )
        })),
        None => manual(question),
    }
}
