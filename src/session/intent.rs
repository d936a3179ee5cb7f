//! Intent classification
//!
//! An ordered list of (matcher, extractor) rules evaluated in fixed priority,
//! terminating at the first match. Configuration and command intents are
//! checked before the catch-all answer fallback, so "set difficulty to hard"
//! is never swallowed as a free-text answer while a question is pending.
//!
//! This is a known-lossy heuristic: a paraphrased command can still land in
//! the answer fallback. That limitation is accepted, not silently patched.

use crate::quiz::{Difficulty, QuestionType};
use regex::Regex;

/// Classified purpose of a user utterance
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    UploadAck,
    ShowSettings,
    SetQuestionType(QuestionType),
    SetQuestionCount(u32),
    SetDifficulty(Difficulty),
    /// `None` clears the focus (cover all topics)
    SetTopic(Option<String>),
    StartReview,
    StopReview,
    ReviewStatus,
    Restart,
    EnableSpeech,
    DisableSpeech,
    Continue,
    Answer(String),
    Unknown,
}

type Extractor = Box<dyn Fn(&str) -> Option<Intent> + Send + Sync>;

struct Rule {
    name: &'static str,
    extract: Extractor,
}

/// Ordered, first-match-wins intent classifier
pub struct IntentClassifier {
    rules: Vec<Rule>,
    continue_pattern: Regex,
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            rules: build_rules(),
            continue_pattern: Regex::new(
                r"(?i)^(ok|okay|sure|yes|yep|yeah|alright|fine|ready|next|continue|go on|go ahead|move on)[.! ]*$",
            )
            .expect("continue pattern must compile"),
        }
    }

    /// Classify an utterance
    ///
    /// `question_pending` controls the fallback: unmatched text becomes an
    /// answer only while a question awaits one, otherwise it is unknown.
    pub fn classify(&self, utterance: &str, question_pending: bool) -> Intent {
        let text = utterance.trim();
        if text.is_empty() {
            return Intent::Unknown;
        }

        for rule in &self.rules {
            if let Some(intent) = (rule.extract)(text) {
                tracing::debug!("Utterance matched intent rule '{}'", rule.name);
                return intent;
            }
        }

        if question_pending {
            return Intent::Answer(text.to_string());
        }

        if self.continue_pattern.is_match(text) {
            return Intent::Continue;
        }

        Intent::Unknown
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("intent pattern must compile")
}

fn rule(
    name: &'static str,
    patterns: Vec<Regex>,
    build: impl Fn(&str, &Regex) -> Option<Intent> + Send + Sync + 'static,
) -> Rule {
    Rule {
        name,
        extract: Box::new(move |text| {
            for pattern in &patterns {
                if pattern.is_match(text) {
                    if let Some(intent) = build(text, pattern) {
                        return Some(intent);
                    }
                }
            }
            None
        }),
    }
}

fn build_rules() -> Vec<Rule> {
    vec![
        // Question count first: bare "10 questions" must win over everything
        rule(
            "set_question_count",
            vec![
                regex(r"(?i)\b(\d+)\s+questions?\b"),
                regex(r"(?i)\bquestions?\s+(?:to|at|of|be|should be)?\s*(\d+)\b"),
                regex(
                    r"(?i)\b(?:set|use|do|want|have|give|ask|make|prepare)\b.{0,12}?\b(\d+)\b.{0,6}\bquestions?\b",
                ),
            ],
            |text, pattern| {
                let captures = pattern.captures(text)?;
                let number = captures
                    .iter()
                    .skip(1)
                    .flatten()
                    .find(|m| m.as_str().chars().all(|c| c.is_ascii_digit()))?;
                number.as_str().parse().ok().map(Intent::SetQuestionCount)
            },
        ),
        rule(
            "set_question_type",
            vec![
                regex(
                    r"(?i)\b(?:set|change|switch|use|do|make|want)\b.{0,24}\b(multiple[\s-]?choice|mc|free[\s-]?text|open[\s-]?ended|mixed)\b",
                ),
                regex(
                    r"(?i)\b(multiple[\s-]?choice|free[\s-]?text|open[\s-]?ended|mixed)\b.{0,16}\b(?:questions?|format|style|type)\b",
                ),
            ],
            |text, _| {
                let lowered = text.to_lowercase();
                if lowered.contains("multiple") || regex(r"(?i)\bmc\b").is_match(text) {
                    Some(Intent::SetQuestionType(QuestionType::MultipleChoice))
                } else if lowered.contains("free") || lowered.contains("open") {
                    Some(Intent::SetQuestionType(QuestionType::FreeText))
                } else if lowered.contains("mixed") {
                    Some(Intent::SetQuestionType(QuestionType::Mixed))
                } else {
                    None
                }
            },
        ),
        rule(
            "set_difficulty",
            vec![
                regex(
                    r"(?i)\b(?:set|change|make|use|switch|want)\b.{0,20}\b(easy|simple|beginner|medium|moderate|intermediate|hard|difficult|challenging|advanced)\b",
                ),
                regex(
                    r"(?i)\b(easy|simple|beginner|medium|moderate|intermediate|hard|difficult|challenging|advanced)\b.{0,12}\b(?:difficulty|level|mode|questions?)\b",
                ),
                regex(
                    r"(?i)\b(?:difficulty|level)\b.{0,16}\b(easy|simple|beginner|medium|moderate|intermediate|hard|difficult|challenging|advanced)\b",
                ),
            ],
            |text, _| extract_difficulty(text).map(Intent::SetDifficulty),
        ),
        rule(
            "set_topic",
            vec![regex(r"(?i)\b(?:all|any|every)\s+(?:available\s+)?topics?\b")],
            |_, _| Some(Intent::SetTopic(None)),
        ),
        rule(
            "set_topic_focus",
            vec![
                regex(
                    r"(?i)\b(?:set|change|make|switch)\s+(?:the\s+)?(?:topic|subject)\s+(?:to|as|about|:)?\s*([^,.!?;]+)",
                ),
                regex(r"(?i)^focus(?:ing)?\s+(?:the\s+review\s+)?on\s+([^,.!?;]+)"),
                regex(
                    r"(?i)\b(?:topic|subject)\s+(?:should|will|must)?\s*(?:be|:)\s*([^,.!?;]+)",
                ),
            ],
            |text, pattern| {
                let captures = pattern.captures(text)?;
                let topic = clean_topic(captures.get(1)?.as_str());
                Some(Intent::SetTopic(topic))
            },
        ),
        rule(
            "show_settings",
            vec![
                regex(
                    r"(?i)\b(?:show|what|display|list|see|view)\b.{0,24}\b(?:settings?|options?|configuration)\b",
                ),
                regex(r"(?i)\bcurrent\s+(?:settings?|options?|configuration)\b"),
            ],
            |_, _| Some(Intent::ShowSettings),
        ),
        rule(
            "upload_ack",
            vec![
                regex(
                    r"(?i)\b(?:upload|add|attach|send)\b.{0,24}\b(?:documents?|pdf|files?|slides?|pptx|material|notes)\b",
                ),
                regex(
                    r"(?i)\b(?:documents?|pdf|files?|slides?|pptx)\b.{0,20}\b(?:upload|add|attach)\b",
                ),
            ],
            |_, _| Some(Intent::UploadAck),
        ),
        rule(
            "enable_speech",
            vec![regex(
                r"(?i)\b(?:enable|activate|turn\s?on|use|start)\b.{0,12}\b(?:speech|voice|audio|speaking)\b",
            )],
            |_, _| Some(Intent::EnableSpeech),
        ),
        rule(
            "disable_speech",
            vec![regex(
                r"(?i)\b(?:disable|deactivate|turn\s?off|stop|mute)\b.{0,12}\b(?:speech|voice|audio|speaking)\b",
            )],
            |_, _| Some(Intent::DisableSpeech),
        ),
        rule(
            "review_status",
            vec![
                regex(r"(?i)\bhow\s+(?:am|are|is)\b.{0,16}\b(?:doing|going|performing|scoring)\b"),
                regex(r"(?i)\b(?:my|the|current)\s+(?:score|progress|status)\b"),
                regex(r"(?i)\b(?:status|progress)\b.{0,12}\b(?:review|quiz|session)\b"),
            ],
            |_, _| Some(Intent::ReviewStatus),
        ),
        // Restart outranks start so "start over" never launches a new review
        rule(
            "restart",
            vec![regex(
                r"(?i)\b(?:restart|start over|start again|reset|another round|go again|new (?:session|review|round))\b",
            )],
            |_, _| Some(Intent::Restart),
        ),
        rule(
            "start_review",
            vec![
                regex(
                    r"(?i)\b(?:start|begin|launch|do)\b.{0,12}\b(?:review|quiz|test|practice|session|reviewing)\b",
                ),
                regex(r"(?i)\blet'?s\s+(?:start|begin|review|practice|go)\b"),
                regex(r"(?i)^(?:start|begin)[.! ]*$"),
            ],
            |_, _| Some(Intent::StartReview),
        ),
        rule(
            "stop_review",
            vec![
                regex(
                    r"(?i)\b(?:stop|end|finish|quit|exit|cancel|terminate|halt)\b.{0,12}\b(?:review|quiz|test|session|practice|reviewing)\b",
                ),
                regex(r"(?i)\bi'?m\s+(?:done|tired|finished)\b"),
            ],
            |_, _| Some(Intent::StopReview),
        ),
    ]
}

fn extract_difficulty(text: &str) -> Option<Difficulty> {
    let lowered = text.to_lowercase();
    if regex(r"\b(easy|simple|beginner)\b").is_match(&lowered) {
        Some(Difficulty::Easy)
    } else if regex(r"\b(medium|moderate|intermediate)\b").is_match(&lowered) {
        Some(Difficulty::Medium)
    } else if regex(r"\b(hard|difficult|challenging|advanced)\b").is_match(&lowered) {
        Some(Difficulty::Hard)
    } else {
        None
    }
}

fn clean_topic(raw: &str) -> Option<String> {
    let mut topic = raw.trim().to_string();

    for prefix in ["the ", "a ", "an ", "topic ", "subject ", "of ", "to ", "on "] {
        if topic.to_lowercase().starts_with(prefix) {
            topic = topic[prefix.len()..].trim().to_string();
        }
    }

    let topic = topic
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();

    if topic.len() > 1 {
        Some(topic)
    } else {
        None
    }
}
