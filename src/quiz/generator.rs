//! Question generation against retrieved context
//!
//! Builds difficulty-specific prompts over the supplied chunks, parses the
//! generation service's JSON reply, and enforces the multiple-choice contract:
//! exactly one correct option and three pairwise-distinct distractors. A
//! defective reply earns one stricter retry before distractors are synthesized
//! from the other retrieved chunks' key terms.

use crate::llm::{generate_with_retry, GenerationClient, GenerationError, GenerationRequest};
use crate::quiz::{letter_index, option_letter, Difficulty, Question, QuestionKind};
use crate::retrieval::ScoredChunk;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Generation knobs copied out of the llm section of the config
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_backoff: Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&crate::config::LlmConfig> for GeneratorSettings {
    fn from(config: &crate::config::LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Generates questions grounded in retrieved chunks
pub struct QuestionGenerator {
    client: Arc<dyn GenerationClient>,
    settings: GeneratorSettings,
}

#[derive(Debug, Deserialize)]
struct McDraft {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FreeDraft {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    key_points: Vec<String>,
}

impl QuestionGenerator {
    pub fn new(client: Arc<dyn GenerationClient>, settings: GeneratorSettings) -> Self {
        Self { client, settings }
    }

    /// Generate one question from the retrieved contexts
    ///
    /// Hard questions are grounded in up to three chunks so they can ask for
    /// synthesis; other difficulties use the single best chunk. The remaining
    /// contexts only feed fallback distractor terms.
    pub async fn generate(
        &self,
        contexts: &[ScoredChunk],
        kind: QuestionKind,
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Question, GenerationError> {
        if contexts.is_empty() {
            return Err(GenerationError::Malformed(
                "no context chunks supplied".to_string(),
            ));
        }

        let primary_count = match difficulty {
            Difficulty::Hard => contexts.len().min(3),
            _ => 1,
        };
        let (primary, rest) = contexts.split_at(primary_count);

        let context_text = primary
            .iter()
            .map(|c| c.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let source_chunk_ids: Vec<i64> = primary.iter().map(|c| c.chunk.id).collect();

        match kind {
            QuestionKind::MultipleChoice => {
                self.generate_multiple_choice(
                    &context_text,
                    source_chunk_ids,
                    rest,
                    difficulty,
                    topic,
                )
                .await
            }
            QuestionKind::FreeText => {
                self.generate_free_text(&context_text, source_chunk_ids, difficulty, topic)
                    .await
            }
        }
    }

    async fn generate_multiple_choice(
        &self,
        context: &str,
        source_chunk_ids: Vec<i64>,
        other_contexts: &[ScoredChunk],
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Question, GenerationError> {
        let text = self.request(mc_prompt(context, difficulty, topic, false)).await?;
        let mut draft = parse_draft::<McDraft>(&text);

        let usable = matches!(&draft, Ok(d) if mc_draft_is_complete(d));
        if !usable {
            tracing::warn!("Multiple-choice draft defective, retrying with stricter instruction");
            let text = self.request(mc_prompt(context, difficulty, topic, true)).await?;
            match parse_draft::<McDraft>(&text) {
                Ok(second) if mc_draft_is_complete(&second) => draft = Ok(second),
                Ok(second) if draft.is_err() => draft = Ok(second),
                _ => {}
            }
        }

        let draft = draft?;
        let (prompt_text, options, answer_idx, explanation) =
            assemble_mc(draft, other_contexts)?;

        let distractors = options
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != answer_idx)
            .map(|(_, o)| o.clone())
            .collect();

        Ok(Question {
            id: Uuid::new_v4(),
            source_chunk_ids,
            kind: QuestionKind::MultipleChoice,
            difficulty,
            prompt_text,
            correct_answer: option_letter(answer_idx).to_string(),
            options,
            distractors,
            key_points: Vec::new(),
            explanation,
            asked_at: Utc::now(),
        })
    }

    async fn generate_free_text(
        &self,
        context: &str,
        source_chunk_ids: Vec<i64>,
        difficulty: Difficulty,
        topic: Option<&str>,
    ) -> Result<Question, GenerationError> {
        let text = self
            .request(free_text_prompt(context, difficulty, topic, false))
            .await?;
        let mut draft = parse_draft::<FreeDraft>(&text);

        let usable = matches!(&draft, Ok(d) if !d.question.trim().is_empty() && !d.answer.trim().is_empty());
        if !usable {
            tracing::warn!("Free-text draft defective, retrying with stricter instruction");
            let text = self
                .request(free_text_prompt(context, difficulty, topic, true))
                .await?;
            if let Ok(second) = parse_draft::<FreeDraft>(&text) {
                draft = Ok(second);
            }
        }

        let draft = draft?;
        if draft.question.trim().is_empty() || draft.answer.trim().is_empty() {
            return Err(GenerationError::Malformed(
                "free-text draft missing question or answer".to_string(),
            ));
        }

        Ok(Question {
            id: Uuid::new_v4(),
            source_chunk_ids,
            kind: QuestionKind::FreeText,
            difficulty,
            prompt_text: draft.question.trim().to_string(),
            correct_answer: draft.answer.trim().to_string(),
            options: Vec::new(),
            distractors: Vec::new(),
            key_points: draft.key_points,
            explanation: None,
            asked_at: Utc::now(),
        })
    }

    async fn request(&self, prompt: String) -> Result<String, GenerationError> {
        let request =
            GenerationRequest::new(prompt, self.settings.max_tokens, self.settings.temperature);
        let response =
            generate_with_retry(self.client.as_ref(), request, self.settings.retry_backoff).await?;
        Ok(response.text)
    }
}

/// Whether an MC draft already satisfies the option contract
fn mc_draft_is_complete(draft: &McDraft) -> bool {
    if draft.question.trim().is_empty() || draft.options.len() < 4 {
        return false;
    }
    let four = &draft.options[..4];
    if four.iter().any(|o| o.trim().is_empty()) {
        return false;
    }
    if !pairwise_distinct(four) {
        return false;
    }
    resolve_answer_index(draft).is_some()
}

fn pairwise_distinct(options: &[String]) -> bool {
    let mut seen: Vec<String> = Vec::new();
    for option in options {
        let normalized = option.trim().to_lowercase();
        if seen.contains(&normalized) {
            return false;
        }
        seen.push(normalized);
    }
    true
}

/// Resolve the draft's answer field (letter or full text) to an option index
fn resolve_answer_index(draft: &McDraft) -> Option<usize> {
    if let Some(idx) = letter_index(&draft.answer) {
        if idx < draft.options.len().min(4) {
            return Some(idx);
        }
    }
    let normalized = draft.answer.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    draft.options.iter().take(4).position(|o| o.trim().to_lowercase() == normalized)
}

/// Turn a draft into final (prompt, options, answer index, explanation),
/// synthesizing distractors from the other chunks' key terms when needed
fn assemble_mc(
    draft: McDraft,
    other_contexts: &[ScoredChunk],
) -> Result<(String, Vec<String>, usize, Option<String>), GenerationError> {
    let question = draft.question.trim().to_string();
    if question.is_empty() {
        return Err(GenerationError::Malformed(
            "multiple-choice draft missing question text".to_string(),
        ));
    }

    if mc_draft_is_complete(&draft) {
        let answer_idx = resolve_answer_index(&draft)
            .ok_or_else(|| GenerationError::Malformed("unresolvable answer".to_string()))?;
        let options: Vec<String> = draft.options[..4]
            .iter()
            .map(|o| o.trim().to_string())
            .collect();
        return Ok((question, options, answer_idx, draft.explanation));
    }

    // Salvage path: keep the correct option, rebuild the distractor set.
    let correct = match resolve_answer_index(&draft) {
        Some(idx) => draft.options[idx].trim().to_string(),
        None if !draft.answer.trim().is_empty() && letter_index(&draft.answer).is_none() => {
            draft.answer.trim().to_string()
        }
        _ => {
            return Err(GenerationError::Malformed(
                "multiple-choice draft has no usable correct answer".to_string(),
            ));
        }
    };

    let mut distractors: Vec<String> = Vec::new();
    let push_distinct = |candidate: String, distractors: &mut Vec<String>| {
        let normalized = candidate.trim().to_lowercase();
        if normalized.is_empty() || normalized == correct.trim().to_lowercase() {
            return;
        }
        if distractors
            .iter()
            .any(|d: &String| d.trim().to_lowercase() == normalized)
        {
            return;
        }
        if distractors.len() < 3 {
            distractors.push(candidate.trim().to_string());
        }
    };

    // Reuse whatever usable distractors the model did produce
    for option in draft.options.iter() {
        push_distinct(option.clone(), &mut distractors);
    }

    // Then synthesize from the other retrieved chunks' key terms
    for chunk in other_contexts {
        for term in &chunk.chunk.topics {
            push_distinct(
                format!("A point about {} not supported by the material", term),
                &mut distractors,
            );
        }
    }

    // Last-resort generic fillers keep the option count contract intact
    for filler in [
        "A claim the material does not make",
        "A detail from an unrelated section",
        "None of the concepts covered in the material",
    ] {
        push_distinct(filler.to_string(), &mut distractors);
    }

    if distractors.len() < 3 {
        return Err(GenerationError::Malformed(
            "could not assemble three distinct distractors".to_string(),
        ));
    }

    // Deterministic correct-answer placement without an RNG
    let answer_idx = (correct.len() + distractors[0].len()) % 4;
    let mut options = distractors;
    options.insert(answer_idx.min(options.len()), correct);

    Ok((question, options, answer_idx, draft.explanation))
}

/// Extract the first JSON object from a completion, tolerating code fences
pub(crate) fn extract_json_object(text: &str) -> Option<String> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let start = cleaned.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in cleaned[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(cleaned[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_draft<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, GenerationError> {
    let json = extract_json_object(text)
        .ok_or_else(|| GenerationError::Malformed("no JSON object in response".to_string()))?;

    serde_json::from_str(&json)
        .map_err(|e| GenerationError::Malformed(format!("invalid JSON in response: {}", e)))
}

fn topic_instruction(topic: Option<&str>) -> String {
    match topic {
        Some(t) => format!("about {}", t),
        None => "on the key concepts in this material".to_string(),
    }
}

fn difficulty_guidance(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "test basic recall and understanding of fundamental concepts",
        Difficulty::Medium => "require application of concepts and some analysis",
        Difficulty::Hard => {
            "require deeper analysis, synthesis across the supplied passages, or evaluation"
        }
    }
}

fn difficulty_specifics(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Focus on fundamental terminology, basic principles, or straightforward facts."
        }
        Difficulty::Medium => {
            "Focus on applying concepts, cause-and-effect relationships, or comparing ideas."
        }
        Difficulty::Hard => {
            "Focus on analyzing complex scenarios, evaluating approaches, or synthesizing \
             information across multiple passages."
        }
    }
}

fn mc_prompt(context: &str, difficulty: Difficulty, topic: Option<&str>, strict: bool) -> String {
    let strict_extra = if strict {
        "\n- Every option must be unique; never repeat or rephrase the correct answer among the \
         incorrect options. Return exactly 3 incorrect options."
    } else {
        ""
    };

    format!(
        "You are an educational expert creating a multiple-choice review question {topic}. \
         The question must {guidance}.\n\
         Use ONLY the material below; do not introduce facts it does not support.\n\n\
         Material:\n{context}\n\n\
         {specifics}\n\n\
         Requirements:\n\
         - Respond with valid JSON only: start with '{{' and end with '}}'.\n\
         - Provide exactly 4 answer options, all plausible and similar in length and style.\n\
         - Exactly one option is correct.\n\
         - Do not prefix options with letters.\n\
         - Do not ask about author names, titles, dates, or other superficial details.{strict_extra}\n\n\
         JSON format:\n\
         {{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"answer\": \"A, B, C, or D\", \"explanation\": \"...\"}}",
        topic = topic_instruction(topic),
        guidance = difficulty_guidance(difficulty),
        context = context,
        specifics = difficulty_specifics(difficulty),
        strict_extra = strict_extra,
    )
}

fn free_text_prompt(
    context: &str,
    difficulty: Difficulty,
    topic: Option<&str>,
    strict: bool,
) -> String {
    let strict_extra = if strict {
        "\n- The question and answer fields are mandatory and must not be empty."
    } else {
        ""
    };

    format!(
        "You are an educational expert creating a thought-provoking free-text review question \
         {topic}. The question must {guidance}.\n\
         Use ONLY the material below; do not introduce facts it does not support.\n\n\
         Material:\n{context}\n\n\
         {specifics}\n\n\
         Requirements:\n\
         - Respond with valid JSON only: start with '{{' and end with '}}'.\n\
         - The question must be answerable from the material alone.\n\
         - Include a model answer and 3-4 key points a good response covers.\n\
         - Do not ask about author names, titles, dates, or other superficial details.{strict_extra}\n\n\
         JSON format:\n\
         {{\"question\": \"...\", \"answer\": \"...\", \"key_points\": [\"...\", \"...\", \"...\"]}}",
        topic = topic_instruction(topic),
        guidance = difficulty_guidance(difficulty),
        context = context,
        specifics = difficulty_specifics(difficulty),
        strict_extra = strict_extra,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::llm::GenerationResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Client that replays a scripted sequence of responses
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, GenerationError> {
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Service("script exhausted".to_string())));
            next.map(|text| GenerationResponse { text })
        }
    }

    fn context_chunk(id: i64, content: &str, topics: &[&str]) -> ScoredChunk {
        ScoredChunk::new(
            Chunk {
                id,
                document_id: Uuid::nil(),
                content: content.to_string(),
                page_number: 1,
                topics: topics.iter().map(|t| t.to_string()).collect(),
                image_count: 0,
            },
            0.9,
        )
    }

    fn settings() -> GeneratorSettings {
        GeneratorSettings {
            temperature: 0.7,
            max_tokens: 256,
            retry_backoff: Duration::from_millis(1),
        }
    }

    const GOOD_MC: &str = r#"{
        "question": "What does the chunker bound?",
        "options": ["Chunk size", "Model weights", "Page colors", "File names"],
        "answer": "A",
        "explanation": "Chunks are size-bounded."
    }"#;

    #[tokio::test]
    async fn test_valid_mc_first_try() {
        let client = ScriptedClient::new(vec![Ok(GOOD_MC.to_string())]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![context_chunk(1, "The chunker bounds chunk size.", &["chunking"])];
        let question = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Easy, None)
            .await
            .unwrap();

        assert_eq!(question.kind, QuestionKind::MultipleChoice);
        assert_eq!(question.options.len(), 4);
        assert_eq!(question.correct_answer, "A");
        assert_eq!(question.distractors.len(), 3);
        assert_eq!(question.source_chunk_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_fenced_json_accepted() {
        let fenced = format!("Here you go:\n```json\n{}\n```", GOOD_MC);
        let client = ScriptedClient::new(vec![Ok(fenced)]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![context_chunk(1, "content", &[])];
        let question = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Easy, None)
            .await
            .unwrap();

        assert_eq!(question.options.len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_distractors_repaired_from_other_chunks() {
        let duplicated = r#"{
            "question": "What does retrieval rank by?",
            "options": ["Cosine similarity", "Cosine similarity", "Cosine similarity", "Cosine similarity"],
            "answer": "A"
        }"#;
        // Both the first attempt and the stricter retry return the bad draft.
        let client = ScriptedClient::new(vec![
            Ok(duplicated.to_string()),
            Ok(duplicated.to_string()),
        ]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![
            context_chunk(1, "Retrieval ranks by cosine similarity.", &["retrieval"]),
            context_chunk(2, "Chunking bounds sizes.", &["chunking"]),
            context_chunk(3, "Embeddings are deterministic.", &["embeddings"]),
        ];
        let question = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Easy, None)
            .await
            .unwrap();

        assert_eq!(question.options.len(), 4);
        // Pairwise distinct, case-insensitive
        let mut normalized: Vec<String> =
            question.options.iter().map(|o| o.to_lowercase()).collect();
        normalized.sort();
        normalized.dedup();
        assert_eq!(normalized.len(), 4);

        let correct_idx = letter_index(&question.correct_answer).unwrap();
        assert_eq!(question.options[correct_idx], "Cosine similarity");
    }

    #[tokio::test]
    async fn test_unparseable_after_retry_is_malformed() {
        let client = ScriptedClient::new(vec![
            Ok("no json here".to_string()),
            Ok("still no json".to_string()),
        ]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![context_chunk(1, "content", &[])];
        let result = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Easy, None)
            .await;

        assert!(matches!(result, Err(GenerationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_service_failure_propagates() {
        // Both the initial call and its automatic retry fail.
        let client = ScriptedClient::new(vec![
            Err(GenerationError::Service("down".to_string())),
            Err(GenerationError::Service("down".to_string())),
        ]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![context_chunk(1, "content", &[])];
        let result = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Easy, None)
            .await;

        assert!(matches!(result, Err(GenerationError::Service(_))));
    }

    #[tokio::test]
    async fn test_free_text_generation() {
        let reply = r#"{
            "question": "Explain how chunks are bounded.",
            "answer": "Chunks merge sentences up to a target token window.",
            "key_points": ["sentence boundaries", "target window", "page tracking"]
        }"#;
        let client = ScriptedClient::new(vec![Ok(reply.to_string())]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![context_chunk(1, "content", &[])];
        let question = generator
            .generate(&contexts, QuestionKind::FreeText, Difficulty::Medium, None)
            .await
            .unwrap();

        assert_eq!(question.kind, QuestionKind::FreeText);
        assert!(question.options.is_empty());
        assert_eq!(question.key_points.len(), 3);
    }

    #[tokio::test]
    async fn test_hard_questions_span_multiple_chunks() {
        let client = ScriptedClient::new(vec![Ok(GOOD_MC.to_string())]);
        let generator = QuestionGenerator::new(client, settings());

        let contexts = vec![
            context_chunk(1, "First passage.", &[]),
            context_chunk(2, "Second passage.", &[]),
            context_chunk(3, "Third passage.", &[]),
            context_chunk(4, "Fourth passage.", &[]),
        ];
        let question = generator
            .generate(&contexts, QuestionKind::MultipleChoice, Difficulty::Hard, None)
            .await
            .unwrap();

        assert_eq!(question.source_chunk_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = "prefix {\"a\": {\"b\": 1}, \"c\": \"x}y\"} suffix";
        let json = extract_json_object(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn test_extract_json_object_missing() {
        assert!(extract_json_object("nothing here").is_none());
    }
}
