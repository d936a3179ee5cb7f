//! Conversational engine
//!
//! [`SessionEngine`] owns one session's state machine and handles a single
//! user turn to completion, including any external generation or evaluation
//! call, before the next turn is accepted. [`ReviewService`] routes turns to
//! the right session; every session gets its own vector-index partition, and
//! shared capabilities are injected rather than reached for globally.

use crate::config::Config;
use crate::document::{
    Chunker, Document, DocumentFormat, OcrEngine, ParsedPage, ParserRegistry, TopicExtractor,
};
use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::error::{Result, RevuError};
use crate::llm::{GenerationClient, GenerationError};
use crate::quiz::{
    AnswerEvaluator, EvaluatorSettings, GeneratorSettings, Question, QuestionGenerator, VerdictKind,
};
use crate::retrieval::{Retriever, RetrieverSettings, ScoredChunk, SearchError};
use crate::session::{
    AskedQuestion, DocumentRecord, Intent, IntentClassifier, Phase, SessionConfig, SessionState,
};
use crate::speech::SpeechSynthesizer;
use crate::storage::StorageManager;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// One user turn's input: an utterance or a raw file upload
#[derive(Debug, Clone)]
pub enum UserInput {
    Utterance(String),
    Upload { filename: String, bytes: Vec<u8> },
}

/// Per-session progress summary
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub correct: u32,
    pub total: u32,
    pub accuracy: f32,
}

/// The system's reply for one turn
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub audio: Option<Vec<u8>>,
    /// Present when this turn asked a new question
    pub question: Option<Question>,
    /// Present when this turn ended or summarized a review
    pub summary: Option<SessionSummary>,
}

/// Result of ingesting one uploaded document
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Indexed {
        document_id: Uuid,
        filename: String,
        chunk_count: usize,
        topics: Vec<String>,
    },
    /// Document rejected; the session is otherwise unaffected
    Rejected { filename: String, reason: String },
}

/// External collaborators injected into every session
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generation: Arc<dyn GenerationClient>,
    pub parsers: Arc<ParserRegistry>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

enum NextQuestionFailure {
    Retrieval(SearchError),
    Generation(GenerationError),
}

/// State machine for one session
pub struct SessionEngine {
    caps: Capabilities,
    storage: Arc<StorageManager>,
    index: Arc<VectorIndex>,
    chunker: Chunker,
    topic_extractor: TopicExtractor,
    classifier: IntentClassifier,
    retriever: Retriever,
    generator: QuestionGenerator,
    evaluator: AnswerEvaluator,
    state: SessionState,
}

impl SessionEngine {
    pub fn new(
        id: Uuid,
        caps: Capabilities,
        storage: Arc<StorageManager>,
        config: &Config,
    ) -> Self {
        let dimension = caps.embedder.dimension();
        if dimension != config.indexing.vector_dim {
            tracing::warn!(
                "Configured vector_dim {} differs from embedder dimension {}; using the embedder's",
                config.indexing.vector_dim,
                dimension
            );
        }

        let index = Arc::new(VectorIndex::new(
            dimension,
            config.indexing.hnsw_ef_construction,
            config.indexing.hnsw_m,
        ));

        let retriever = Retriever::new(
            caps.embedder.clone(),
            index.clone(),
            storage.clone(),
            RetrieverSettings::from(&config.retrieval),
        );

        let generator = QuestionGenerator::new(
            caps.generation.clone(),
            GeneratorSettings::from(&config.llm),
        );
        let evaluator = AnswerEvaluator::new(
            caps.generation.clone(),
            EvaluatorSettings::from(&config.llm),
        );

        let state = SessionState::new(
            id,
            SessionConfig::from(&config.session),
            config.speech.enabled,
        );

        Self {
            caps,
            storage,
            index,
            chunker: Chunker::new(config.chunking.clone()),
            topic_extractor: TopicExtractor::new(config.chunking.topics_per_chunk),
            classifier: IntentClassifier::new(),
            retriever,
            generator,
            evaluator,
            state,
        }
    }

    /// Current session state (read-only)
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one user turn to completion
    pub async fn handle_utterance(&mut self, input: UserInput) -> Result<TurnReply> {
        match input {
            UserInput::Upload { filename, bytes } => self.handle_upload(&filename, &bytes).await,
            UserInput::Utterance(text) => {
                let pending = self.state.phase == Phase::AwaitingAnswer
                    && self.state.current_question.is_some();
                let intent = self.classifier.classify(&text, pending);
                self.dispatch(intent).await
            }
        }
    }

    async fn dispatch(&mut self, intent: Intent) -> Result<TurnReply> {
        // The terminal phase accepts only a restart; read-only intents may
        // still answer, mutations may not.
        if self.state.phase == Phase::Complete
            && !matches!(
                intent,
                Intent::Restart | Intent::ShowSettings | Intent::ReviewStatus
            )
        {
            return Ok(self.reply(
                "This review is complete. Say \"start over\" to review the same material again."
                    .to_string(),
            ));
        }

        match intent {
            Intent::UploadAck => Ok(self.reply(
                "Attach the file directly in the chat and I'll index it for review.".to_string(),
            )),
            Intent::ShowSettings => Ok(self.settings_reply()),
            Intent::SetQuestionType(question_type) => {
                self.state.config.question_type = question_type;
                Ok(self.reply(format!(
                    "I'll use {} questions for our review.",
                    question_type
                )))
            }
            Intent::SetQuestionCount(count) => {
                if (1..=50).contains(&count) {
                    self.state.config.question_count = count;
                    Ok(self.reply(format!(
                        "I'll prepare {} questions for our review session.",
                        count
                    )))
                } else {
                    Ok(self.reply(
                        "Please choose a number of questions between 1 and 50.".to_string(),
                    ))
                }
            }
            Intent::SetDifficulty(difficulty) => {
                self.state.config.difficulty = difficulty;
                Ok(self.reply(format!(
                    "I'll set the difficulty to {} for our review.",
                    difficulty
                )))
            }
            Intent::SetTopic(Some(topic)) => {
                let message = format!("I'll focus our review on: {}.", topic);
                self.state.config.topic_focus = Some(topic);
                Ok(self.reply(message))
            }
            Intent::SetTopic(None) => {
                self.state.config.topic_focus = None;
                Ok(self.reply(
                    "I'll cover all available topics in the documents during our review."
                        .to_string(),
                ))
            }
            Intent::StartReview => self.handle_start_review().await,
            Intent::StopReview => Ok(self.handle_stop_review()),
            Intent::ReviewStatus => Ok(self.status_reply()),
            Intent::Restart => Ok(self.handle_restart()),
            Intent::EnableSpeech => {
                self.state.speech_enabled = true;
                Ok(self.reply(
                    "Speech output is now enabled. I'll attach audio to my replies.".to_string(),
                ))
            }
            Intent::DisableSpeech => {
                self.state.speech_enabled = false;
                Ok(self.reply("Speech output is now disabled.".to_string()))
            }
            Intent::Continue => self.handle_continue().await,
            Intent::Answer(text) => self.handle_answer(&text).await,
            Intent::Unknown => Ok(self.reply(
                "I'm not sure what you'd like to do. You can upload documents, adjust the \
                 review settings, start or stop a review, answer the current question, or \
                 ask how you're doing."
                    .to_string(),
            )),
        }
    }

    /// Ingest an uploaded document: parse, chunk, embed, store, index
    ///
    /// The storage write is transactional and the vector index is only
    /// updated after the commit, so a document is never partially visible to
    /// retrieval.
    pub async fn ingest_document(&mut self, filename: &str, bytes: &[u8]) -> Result<IngestOutcome> {
        let format = DocumentFormat::from_filename(filename);

        let mut pages = match self.caps.parsers.parse(bytes, format) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!("Rejected document '{}': {}", filename, e);
                return Ok(IngestOutcome::Rejected {
                    filename: filename.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        self.enrich_with_ocr(&mut pages);

        let document = Document::from_pages(filename, pages);
        let drafts = self.chunker.chunk(&document);

        if drafts.is_empty() {
            return Ok(IngestOutcome::Rejected {
                filename: filename.to_string(),
                reason: "no text content could be extracted".to_string(),
            });
        }

        let contents: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
        let vectors = match self.caps.embedder.embed_batch(&contents) {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::error!("Embedding failed for '{}': {}", filename, e);
                return Ok(IngestOutcome::Rejected {
                    filename: filename.to_string(),
                    reason: format!(
                        "the embedding service is unavailable ({}); try uploading again",
                        e
                    ),
                });
            }
        };

        let topic_lists: Vec<Vec<String>> = drafts.iter().map(|d| d.topics.clone()).collect();
        let aggregate_topics = self.topic_extractor.aggregate(&topic_lists);

        let chunks = self.storage.database.insert_document(
            &self.state.id,
            &document.id,
            filename,
            document.page_count(),
            &aggregate_topics,
            &drafts,
            &vectors,
            self.caps.embedder.model_name(),
        )?;

        for (chunk, vector) in chunks.iter().zip(&vectors) {
            self.index.insert(chunk.id, vector)?;
        }

        self.state.documents.push(DocumentRecord {
            id: document.id,
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            topics: aggregate_topics.clone(),
        });

        if self.state.phase == Phase::AwaitingUpload {
            self.state.phase = Phase::Configuring;
        }

        tracing::info!(
            "Indexed '{}': {} chunks across {} pages",
            filename,
            chunks.len(),
            document.page_count()
        );

        Ok(IngestOutcome::Indexed {
            document_id: document.id,
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            topics: aggregate_topics,
        })
    }

    fn enrich_with_ocr(&self, pages: &mut [ParsedPage]) {
        let Some(ocr) = &self.caps.ocr else {
            return;
        };

        for page in pages.iter_mut() {
            for image in &page.images {
                match ocr.extract_text(image) {
                    Ok(text) if !text.trim().is_empty() => {
                        page.text.push('\n');
                        page.text.push_str(text.trim());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Enrichment only; the chunk keeps its text-only content
                        tracing::warn!("OCR failed on page {}: {}", page.index, e);
                    }
                }
            }
        }
    }

    async fn handle_upload(&mut self, filename: &str, bytes: &[u8]) -> Result<TurnReply> {
        match self.ingest_document(filename, bytes).await? {
            IngestOutcome::Indexed {
                chunk_count,
                topics,
                ..
            } => {
                let topic_note = if topics.is_empty() {
                    String::new()
                } else {
                    format!(
                        " Main topics: {}.",
                        topics.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
                    )
                };
                Ok(self.reply(format!(
                    "I've processed '{}' into {} chunks.{} You can say \"start review\" to \
                     begin, \"show settings\" to configure the session, or upload more material.",
                    filename, chunk_count, topic_note
                )))
            }
            IngestOutcome::Rejected { filename, reason } => Ok(self.reply(format!(
                "I couldn't process '{}': {}. The document was not added.",
                filename, reason
            ))),
        }
    }

    async fn handle_start_review(&mut self) -> Result<TurnReply> {
        if self.state.phase.reviewing() {
            return Ok(self.reply(
                "We're already in a review session. Answer the current question, or say \
                 \"stop review\" to end it."
                    .to_string(),
            ));
        }

        if self.state.documents.is_empty() {
            return Ok(self.reply(
                "Please upload some documents first so I have material to review with you."
                    .to_string(),
            ));
        }

        // Fresh run: progress resets, repeat-avoidance memory is kept
        let resume_phase = self.state.phase;
        self.state.score = Default::default();
        self.state.history.clear();
        self.state.question_queue.clear();
        self.state.phase = Phase::InReview;

        match self.next_question().await {
            Ok(question) => {
                let rendered = question.render();
                self.state.current_question = Some(question.clone());
                self.state.phase = Phase::AwaitingAnswer;
                let mut reply = self.reply(format!(
                    "Let's start the review session: {} questions at {} difficulty.\n\nFirst \
                     question:\n{}",
                    self.state.config.question_count, self.state.config.difficulty, rendered
                ));
                reply.question = Some(question);
                Ok(reply)
            }
            Err(failure) => {
                self.state.phase = resume_phase;
                Ok(self.failure_reply(failure))
            }
        }
    }

    async fn handle_answer(&mut self, text: &str) -> Result<TurnReply> {
        let Some(question) = self.state.current_question.clone() else {
            return Ok(self.reply(
                "There's no active question right now. Say \"start review\" to begin.".to_string(),
            ));
        };

        let verdict = match self.evaluator.evaluate(&question, text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                // Explicit error turn: the question stays pending, nothing is
                // scored, and the user can simply answer again.
                tracing::error!("Evaluation failed: {}", e);
                return Ok(self.reply(format!(
                    "{} Your answer was not recorded; please send it again.",
                    generation_failure_text(&e)
                )));
            }
        };

        self.state.score.total += 1;
        if verdict.kind == VerdictKind::Correct {
            self.state.score.correct += 1;
        }
        self.state
            .used_chunk_ids
            .extend(question.source_chunk_ids.iter().copied());
        self.state.history.push(AskedQuestion {
            question,
            user_answer: text.to_string(),
            verdict: verdict.clone(),
        });
        self.state.current_question = None;

        if self.state.score.total >= self.state.config.question_count {
            self.state.phase = Phase::Complete;
            let summary = self.summary();
            let mut reply = self.reply(format!(
                "{}\n\nThat completes our review session. You answered {} out of {} questions \
                 correctly ({:.1}%). Say \"start over\" to review again.",
                verdict.feedback, summary.correct, summary.total, summary.accuracy
            ));
            reply.summary = Some(summary);
            return Ok(reply);
        }

        self.state.phase = Phase::InReview;
        match self.next_question().await {
            Ok(question) => {
                let rendered = question.render();
                self.state.current_question = Some(question.clone());
                self.state.phase = Phase::AwaitingAnswer;
                let mut reply = self
                    .reply(format!("{}\n\nNext question:\n{}", verdict.feedback, rendered));
                reply.question = Some(question);
                Ok(reply)
            }
            Err(failure) => {
                // The answer is recorded; only the next question is missing.
                let failure_reply = self.failure_reply(failure);
                Ok(self.reply(format!("{}\n\n{}", verdict.feedback, failure_reply.text)))
            }
        }
    }

    async fn handle_continue(&mut self) -> Result<TurnReply> {
        match self.state.phase {
            Phase::InReview if self.state.current_question.is_none() => {
                match self.next_question().await {
                    Ok(question) => {
                        let rendered = question.render();
                        self.state.current_question = Some(question.clone());
                        self.state.phase = Phase::AwaitingAnswer;
                        let mut reply = self.reply(format!("Next question:\n{}", rendered));
                        reply.question = Some(question);
                        Ok(reply)
                    }
                    Err(failure) => Ok(self.failure_reply(failure)),
                }
            }
            Phase::AwaitingAnswer => {
                let rendered = self
                    .state
                    .current_question
                    .as_ref()
                    .map(|q| q.render())
                    .unwrap_or_default();
                Ok(self.reply(format!(
                    "We're mid-question; here it is again:\n{}",
                    rendered
                )))
            }
            _ => Ok(self.reply(
                "There's nothing to continue right now. Say \"start review\" to begin a \
                 session."
                    .to_string(),
            )),
        }
    }

    fn handle_stop_review(&mut self) -> TurnReply {
        if !self.state.phase.reviewing() {
            return self.reply("We're not currently in a review session.".to_string());
        }

        self.state.current_question = None;
        self.state.question_queue.clear();
        self.state.phase = Phase::Ready;

        let summary = self.summary();
        let mut reply = self.reply(format!(
            "Review session ended. You answered {} out of {} questions correctly ({:.1}%).",
            summary.correct, summary.total, summary.accuracy
        ));
        reply.summary = Some(summary);
        reply
    }

    fn handle_restart(&mut self) -> TurnReply {
        match self.state.phase {
            Phase::Complete | Phase::Ready | Phase::Configuring => {
                self.state.restart();
                self.reply(
                    "Progress reset; your documents are still indexed. Say \"start review\" \
                     when you're ready."
                        .to_string(),
                )
            }
            Phase::AwaitingUpload => self.reply(
                "There's nothing to restart yet. Upload a document to get going.".to_string(),
            ),
            _ => self.reply(
                "We're mid-review. Say \"stop review\" first if you want to start over."
                    .to_string(),
            ),
        }
    }

    fn status_reply(&self) -> TurnReply {
        if !self.state.phase.reviewing() && self.state.score.total == 0 {
            return self.reply("You haven't answered any review questions yet.".to_string());
        }

        let score = self.state.score;
        let mut text = format!(
            "You've answered {} out of {} questions correctly ({:.1}%).",
            score.correct,
            score.total,
            score.accuracy()
        );
        if self.state.phase.reviewing() {
            text.push_str(&format!(
                " There are {} questions remaining in this session.",
                self.state.remaining_questions()
            ));
        }

        self.reply(text)
    }

    fn settings_reply(&self) -> TurnReply {
        let config = &self.state.config;
        let topic = config
            .topic_focus
            .as_deref()
            .unwrap_or("all available topics");
        let documents = if self.state.documents.is_empty() {
            "none yet".to_string()
        } else {
            self.state
                .documents
                .iter()
                .map(|d| format!("{} ({} chunks)", d.filename, d.chunk_count))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let topics = self.state.aggregate_topics();
        let topics_note = if topics.is_empty() {
            String::new()
        } else {
            format!(
                "\n- Available topics: {}",
                topics.iter().take(8).cloned().collect::<Vec<_>>().join(", ")
            )
        };

        self.reply(format!(
            "Current review settings:\n- Question type: {}\n- Number of questions: {}\n- \
             Difficulty: {}\n- Topic focus: {}\n- Documents: {}{}",
            config.question_type, config.question_count, config.difficulty, topic, documents,
            topics_note
        ))
    }

    /// Produce the next question: queued first, otherwise retrieve and generate
    async fn next_question(&mut self) -> std::result::Result<Question, NextQuestionFailure> {
        if let Some(question) = self.state.question_queue.pop_front() {
            return Ok(question);
        }

        let limit = (self.state.remaining_questions().max(1) as usize).max(4);
        let topics = self.state.aggregate_topics();

        let contexts: Vec<ScoredChunk> = self
            .retriever
            .retrieve_for_question(
                self.state.config.topic_focus.as_deref(),
                &topics,
                limit,
                &self.state.used_chunk_ids,
            )
            .map_err(NextQuestionFailure::Retrieval)?;

        let kind = self
            .state
            .config
            .question_type
            .resolve(self.state.score.total);

        self.generator
            .generate(
                &contexts,
                kind,
                self.state.config.difficulty,
                self.state.config.topic_focus.as_deref(),
            )
            .await
            .map_err(NextQuestionFailure::Generation)
    }

    fn failure_reply(&self, failure: NextQuestionFailure) -> TurnReply {
        match failure {
            NextQuestionFailure::Retrieval(SearchError::EmptyScope { scope }) => self.reply(format!(
                "I couldn't find any indexed content for {}. Upload more material, or say \
                 \"cover all topics\" to clear the topic focus.",
                scope
            )),
            NextQuestionFailure::Retrieval(e) => {
                tracing::error!("Retrieval failed: {}", e);
                self.reply(
                    "Something went wrong while searching your documents. Please try again."
                        .to_string(),
                )
            }
            NextQuestionFailure::Generation(e) => {
                tracing::error!("Question generation failed: {}", e);
                self.reply(format!(
                    "{} Say \"continue\" to try again.",
                    generation_failure_text(&e)
                ))
            }
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            correct: self.state.score.correct,
            total: self.state.score.total,
            accuracy: self.state.score.accuracy(),
        }
    }

    fn reply(&self, text: String) -> TurnReply {
        let audio = if self.state.speech_enabled {
            self.caps.synthesizer.as_ref().and_then(|s| {
                s.synthesize(&text)
                    .map_err(|e| tracing::debug!("Speech synthesis unavailable: {}", e))
                    .ok()
            })
        } else {
            None
        };

        TurnReply {
            text,
            audio,
            question: None,
            summary: None,
        }
    }
}

fn generation_failure_text(error: &GenerationError) -> String {
    match error {
        GenerationError::Timeout { seconds } => format!(
            "The generation service timed out after {} seconds.",
            seconds
        ),
        GenerationError::Service(_) => "I couldn't reach the generation service; please make \
                                        sure the model server is running."
            .to_string(),
        GenerationError::Malformed(_) => {
            "The generation service returned something I couldn't use.".to_string()
        }
    }
}

/// Multi-session front door: the single entry point the UI layer calls
pub struct ReviewService {
    config: Config,
    caps: Capabilities,
    storage: Arc<StorageManager>,
    sessions: HashMap<Uuid, SessionEngine>,
}

impl ReviewService {
    pub fn new(caps: Capabilities, storage: Arc<StorageManager>, config: Config) -> Self {
        Self {
            config,
            caps,
            storage,
            sessions: HashMap::new(),
        }
    }

    /// Create a new session with its own state and index partition
    pub fn create_session(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        let engine = SessionEngine::new(id, self.caps.clone(), self.storage.clone(), &self.config);
        self.sessions.insert(id, engine);
        tracing::info!("Created session {}", id);
        id
    }

    /// Handle one turn for one session
    pub async fn handle_utterance(
        &mut self,
        session_id: &Uuid,
        input: UserInput,
    ) -> Result<TurnReply> {
        let engine = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RevuError::SessionNotFound {
                id: session_id.to_string(),
            })?;

        engine.handle_utterance(input).await
    }

    /// Access a session's engine (read-only)
    pub fn session(&self, session_id: &Uuid) -> Option<&SessionEngine> {
        self.sessions.get(session_id)
    }

    /// Drop a session's in-memory state; indexed documents stay in storage
    pub fn end_session(&mut self, session_id: &Uuid) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}
