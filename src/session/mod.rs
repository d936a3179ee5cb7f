//! Session state and the conversational state machine
//!
//! A session owns the uploaded documents, the review configuration, the live
//! question, and the score. Every user utterance is handled to completion by
//! the engine before the next one is accepted.

mod engine;
mod intent;

pub use engine::{
    Capabilities, IngestOutcome, ReviewService, SessionEngine, SessionSummary, TurnReply, UserInput,
};
pub use intent::{Intent, IntentClassifier};

use crate::quiz::{Difficulty, Question, QuestionType, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Primary phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No documents indexed yet
    AwaitingUpload,
    /// Documents indexed; settings being adjusted
    Configuring,
    /// Configured and ready to start a review
    Ready,
    /// Review running but no question currently pending
    InReview,
    /// A question has been asked and awaits the user's answer
    AwaitingAnswer,
    /// The review reached its configured question count
    Complete,
}

impl Phase {
    /// Whether a review is currently running
    pub fn reviewing(&self) -> bool {
        matches!(self, Phase::InReview | Phase::AwaitingAnswer)
    }
}

/// Review configuration; mutable mid-session, applies to later questions only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub question_count: u32,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub topic_focus: Option<String>,
}

impl From<&crate::config::SessionDefaults> for SessionConfig {
    fn from(defaults: &crate::config::SessionDefaults) -> Self {
        Self {
            question_count: defaults.question_count,
            question_type: defaults.question_type,
            difficulty: defaults.difficulty,
            topic_focus: None,
        }
    }
}

/// Running score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Score {
    pub correct: u32,
    pub total: u32,
}

impl Score {
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.correct as f32 / self.total as f32) * 100.0
        }
    }
}

/// Record of one indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub filename: String,
    pub chunk_count: usize,
    pub topics: Vec<String>,
}

/// A question together with its answer and verdict, kept for the summary
#[derive(Debug, Clone)]
pub struct AskedQuestion {
    pub question: Question,
    pub user_answer: String,
    pub verdict: Verdict,
}

/// The single mutable aggregate owned by one conversation loop
#[derive(Debug)]
pub struct SessionState {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
    pub config: SessionConfig,
    pub used_chunk_ids: HashSet<i64>,
    pub question_queue: VecDeque<Question>,
    pub current_question: Option<Question>,
    pub history: Vec<AskedQuestion>,
    pub score: Score,
    pub phase: Phase,
    pub speech_enabled: bool,
}

impl SessionState {
    pub fn new(id: Uuid, config: SessionConfig, speech_enabled: bool) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            documents: Vec::new(),
            config,
            used_chunk_ids: HashSet::new(),
            question_queue: VecDeque::new(),
            current_question: None,
            history: Vec::new(),
            score: Score::default(),
            phase: Phase::AwaitingUpload,
            speech_enabled,
        }
    }

    /// Reset review progress while keeping indexed documents and settings
    pub fn restart(&mut self) {
        self.score = Score::default();
        self.used_chunk_ids.clear();
        self.question_queue.clear();
        self.current_question = None;
        self.history.clear();
        self.phase = if self.documents.is_empty() {
            Phase::AwaitingUpload
        } else {
            Phase::Ready
        };
    }

    /// Questions still owed in the running review
    pub fn remaining_questions(&self) -> u32 {
        self.config.question_count.saturating_sub(self.score.total)
    }

    /// Merged topic tags across all indexed documents
    pub fn aggregate_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for doc in &self.documents {
            for topic in &doc.topics {
                if !topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                    topics.push(topic.clone());
                }
            }
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(
            Uuid::new_v4(),
            SessionConfig {
                question_count: 5,
                question_type: QuestionType::MultipleChoice,
                difficulty: Difficulty::Medium,
                topic_focus: None,
            },
            false,
        )
    }

    #[test]
    fn test_new_session_awaits_upload() {
        let s = state();
        assert_eq!(s.phase, Phase::AwaitingUpload);
        assert_eq!(s.score.total, 0);
        assert!(!s.phase.reviewing());
    }

    #[test]
    fn test_restart_preserves_documents() {
        let mut s = state();
        s.documents.push(DocumentRecord {
            id: Uuid::new_v4(),
            filename: "deck.txt".to_string(),
            chunk_count: 5,
            topics: vec!["topic".to_string()],
        });
        s.score = Score {
            correct: 2,
            total: 3,
        };
        s.used_chunk_ids.insert(7);
        s.phase = Phase::Complete;

        s.restart();

        assert_eq!(s.phase, Phase::Ready);
        assert_eq!(s.score.total, 0);
        assert!(s.used_chunk_ids.is_empty());
        assert_eq!(s.documents.len(), 1);
    }

    #[test]
    fn test_accuracy() {
        let score = Score {
            correct: 3,
            total: 4,
        };
        assert!((score.accuracy() - 75.0).abs() < f32::EPSILON);
        assert_eq!(Score::default().accuracy(), 0.0);
    }

    #[test]
    fn test_aggregate_topics_deduplicates() {
        let mut s = state();
        for (name, topics) in [
            ("a.txt", vec!["Nets", "layers"]),
            ("b.txt", vec!["nets", "loss"]),
        ] {
            s.documents.push(DocumentRecord {
                id: Uuid::new_v4(),
                filename: name.to_string(),
                chunk_count: 1,
                topics: topics.into_iter().map(String::from).collect(),
            });
        }

        let topics = s.aggregate_topics();
        assert_eq!(topics.len(), 3);
    }
}
