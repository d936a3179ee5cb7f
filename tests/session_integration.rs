//! End-to-end session tests with mock embedding and generation backends

use async_trait::async_trait;
use revu::config::Config;
use revu::document::ParserRegistry;
use revu::embedding::{EmbeddingError, EmbeddingProvider};
use revu::llm::{GenerationClient, GenerationError, GenerationRequest, GenerationResponse};
use revu::quiz::{Difficulty, QuestionKind, VerdictKind};
use revu::session::{Capabilities, Phase, ReviewService, UserInput};
use revu::storage::StorageManager;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Deterministic embedder: a pure function of the text bytes
struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; 16];
        for (i, b) in text.bytes().enumerate() {
            v[(b as usize + i) % 16] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        16
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }
}

/// How the mock should answer evaluation prompts
#[derive(Clone, Copy)]
enum EvalBehavior {
    Correct,
    Garbage,
    Error,
}

/// Generation mock that answers by prompt kind
struct MockGenerator {
    eval: EvalBehavior,
}

#[async_trait]
impl GenerationClient for MockGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let prompt = &request.prompt;

        if prompt.contains("expert educational evaluator") {
            return match self.eval {
                EvalBehavior::Correct => Ok(GenerationResponse {
                    text: r#"{"is_correct": true, "feedback": "Nice work."}"#.to_string(),
                }),
                EvalBehavior::Garbage => Ok(GenerationResponse {
                    text: "hmm, partially right I suppose".to_string(),
                }),
                EvalBehavior::Error => Err(GenerationError::Service("judge down".to_string())),
            };
        }

        if prompt.contains("multiple-choice review question") {
            return Ok(GenerationResponse {
                text: r#"{
                    "question": "Which component bounds chunk sizes?",
                    "options": ["The embedder", "The chunker", "The retriever", "The index"],
                    "answer": "B",
                    "explanation": "The chunker merges sentences toward a target window."
                }"#
                .to_string(),
            });
        }

        Ok(GenerationResponse {
            text: r#"{
                "question": "Explain how chunks are produced from pages.",
                "answer": "Sentences merge at boundaries until a target window is reached.",
                "key_points": ["sentence boundaries", "target window", "page numbers"]
            }"#
            .to_string(),
        })
    }
}

/// Generation backend that is entirely unavailable
struct DownGenerator;

#[async_trait]
impl GenerationClient for DownGenerator {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        Err(GenerationError::Service("connection refused".to_string()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    // Small windows so a five-page fixture yields five chunks
    config.chunking.min_tokens = 4;
    config.chunking.target_tokens = 10;
    config.chunking.max_tokens = 24;
    config.indexing.vector_dim = 16;
    config.llm.retry_backoff_ms = 1;
    config.session.question_count = 3;
    config
}

fn build_service(generation: Arc<dyn GenerationClient>) -> (ReviewService, Uuid, TempDir) {
    let temp = TempDir::new().unwrap();
    let storage = Arc::new(StorageManager::new(temp.path().to_path_buf()).unwrap());

    let caps = Capabilities {
        embedder: Arc::new(HashEmbedder),
        generation,
        parsers: Arc::new(ParserRegistry::with_defaults()),
        ocr: None,
        synthesizer: None,
    };

    let mut service = ReviewService::new(caps, storage, test_config());
    let session_id = service.create_session();
    (service, session_id, temp)
}

/// Five pages, each a sentence long enough to flush as its own chunk
fn five_page_document() -> Vec<u8> {
    let pages = [
        "Backpropagation computes gradients layer by layer through the whole network stack.",
        "Convolution layers learn spatial filters that respond to local patterns in images.",
        "Dropout regularization randomly disables units so the network cannot co-adapt.",
        "Attention mechanisms weight tokens by relevance when building context summaries.",
        "Gradient clipping bounds update magnitudes to keep recurrent training stable.",
    ];
    pages.join("\u{0c}").into_bytes()
}

async fn say(service: &mut ReviewService, id: &Uuid, text: &str) -> revu::session::TurnReply {
    service
        .handle_utterance(id, UserInput::Utterance(text.to_string()))
        .await
        .unwrap()
}

async fn upload(service: &mut ReviewService, id: &Uuid) -> revu::session::TurnReply {
    service
        .handle_utterance(
            id,
            UserInput::Upload {
                filename: "lecture.txt".to_string(),
                bytes: five_page_document(),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_multiple_choice_review() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    let reply = upload(&mut service, &id).await;
    assert!(reply.text.contains("lecture.txt"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.documents[0].chunk_count, 5);
    assert_eq!(state.phase, Phase::Configuring);

    say(&mut service, &id, "3 questions please").await;
    say(&mut service, &id, "use multiple choice questions").await;

    let reply = say(&mut service, &id, "start the review").await;
    assert!(reply.question.is_some());
    assert_eq!(
        service.session(&id).unwrap().state().phase,
        Phase::AwaitingAnswer
    );

    // Three sequential awaiting-answer turns, then completion
    for turn in 0..3 {
        let state = service.session(&id).unwrap().state();
        assert_eq!(state.phase, Phase::AwaitingAnswer, "turn {}", turn);
        assert_eq!(state.score.total, turn);

        let reply = say(&mut service, &id, "B").await;

        let state = service.session(&id).unwrap().state();
        assert_eq!(state.score.total, turn + 1);

        if turn < 2 {
            assert!(reply.question.is_some(), "turn {} should ask again", turn);
        } else {
            assert!(reply.summary.is_some(), "final turn should summarize");
        }
    }

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, Phase::Complete);
    assert_eq!(state.score.total, 3);
    assert_eq!(state.score.correct, 3);
    assert!(state.current_question.is_none());
}

#[tokio::test]
async fn test_start_review_without_documents() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    let reply = say(&mut service, &id, "start the review").await;

    assert!(reply.text.contains("upload"));
    assert!(reply.question.is_none());

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, Phase::AwaitingUpload);
    assert!(state.current_question.is_none());
    assert_eq!(state.score.total, 0);
}

#[tokio::test]
async fn test_config_command_during_pending_question() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "start the review").await;

    let pending_before = service
        .session(&id)
        .unwrap()
        .state()
        .current_question
        .clone()
        .expect("a question should be pending");

    let reply = say(&mut service, &id, "set difficulty to hard").await;
    assert!(reply.text.contains("hard"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.config.difficulty, Difficulty::Hard);
    assert_eq!(state.phase, Phase::AwaitingAnswer);
    assert_eq!(state.score.total, 0, "the pending question was not answered");
    assert_eq!(
        state.current_question.as_ref().map(|q| q.id),
        Some(pending_before.id),
        "the pending question is unchanged"
    );
}

#[tokio::test]
async fn test_generation_outage_does_not_advance_state() {
    let (mut service, id, _temp) = build_service(Arc::new(DownGenerator));

    upload(&mut service, &id).await;
    let phase_before = service.session(&id).unwrap().state().phase;

    let reply = say(&mut service, &id, "start the review").await;

    assert!(reply.text.contains("generation service"));
    assert!(reply.question.is_none());

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, phase_before);
    assert!(state.current_question.is_none());
    assert_eq!(state.score.total, 0);
}

#[tokio::test]
async fn test_free_text_ambiguous_verdict_flags_manual_review() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Garbage }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "use free text questions").await;
    say(&mut service, &id, "start the review").await;

    let state = service.session(&id).unwrap().state();
    assert_eq!(
        state.current_question.as_ref().map(|q| q.kind),
        Some(QuestionKind::FreeText)
    );

    let reply = say(&mut service, &id, "chunks merge sentences into windows").await;

    assert!(reply.text.contains("manual review"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.score.total, 1, "manual review still counts as answered");
    assert_eq!(state.score.correct, 0, "manual review is not scored correct");
    assert_eq!(
        state.history[0].verdict.kind,
        VerdictKind::ManualReview
    );
}

#[tokio::test]
async fn test_evaluation_outage_keeps_question_pending() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Error }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "use free text questions").await;
    say(&mut service, &id, "start the review").await;

    let pending = service
        .session(&id)
        .unwrap()
        .state()
        .current_question
        .clone()
        .expect("a question should be pending");

    let reply = say(&mut service, &id, "my answer").await;

    assert!(reply.text.contains("not recorded"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.score.total, 0, "a failed evaluation must not score");
    assert_eq!(
        state.current_question.as_ref().map(|q| q.id),
        Some(pending.id),
        "the question stays pending for a retry"
    );
}

#[tokio::test]
async fn test_used_chunks_grow_and_reset_on_restart() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "start the review").await;

    let mut seen = 0;
    for _ in 0..3 {
        say(&mut service, &id, "B").await;
        let used = service.session(&id).unwrap().state().used_chunk_ids.len();
        assert!(used >= seen, "used_chunk_ids never shrinks mid-review");
        seen = used;
    }
    assert!(seen > 0);

    assert_eq!(service.session(&id).unwrap().state().phase, Phase::Complete);

    let reply = say(&mut service, &id, "start over").await;
    assert!(reply.text.contains("reset"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(state.used_chunk_ids.is_empty());
    assert_eq!(state.score.total, 0);
    assert_eq!(state.documents.len(), 1, "documents survive a restart");
}

#[tokio::test]
async fn test_complete_phase_accepts_only_restart() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "start the review").await;
    for _ in 0..3 {
        say(&mut service, &id, "B").await;
    }
    assert_eq!(service.session(&id).unwrap().state().phase, Phase::Complete);

    let reply = say(&mut service, &id, "start the review").await;
    assert!(reply.text.contains("start over"));
    assert_eq!(service.session(&id).unwrap().state().phase, Phase::Complete);

    let reply = say(&mut service, &id, "5 questions").await;
    assert!(reply.text.contains("start over"));
    assert_eq!(
        service.session(&id).unwrap().state().config.question_count,
        3,
        "configuration must not change in the terminal phase"
    );
}

#[tokio::test]
async fn test_stop_review_early_returns_summary() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "start the review").await;
    say(&mut service, &id, "B").await;

    let reply = say(&mut service, &id, "stop the review").await;

    let summary = reply.summary.expect("early stop should summarize");
    assert_eq!(summary.total, 1);

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(state.current_question.is_none());
}

#[tokio::test]
async fn test_unknown_utterance_gets_clarification() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    let reply = say(&mut service, &id, "please harmonize the flux capacitor").await;
    assert!(reply.text.contains("not sure"));

    let state = service.session(&id).unwrap().state();
    assert_eq!(state.phase, Phase::AwaitingUpload);
}

#[tokio::test]
async fn test_settings_reply_reflects_configuration() {
    let (mut service, id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    upload(&mut service, &id).await;
    say(&mut service, &id, "set difficulty to easy").await;
    say(&mut service, &id, "7 questions").await;

    let reply = say(&mut service, &id, "show me the current settings").await;
    assert!(reply.text.contains("easy"));
    assert!(reply.text.contains('7'));
    assert!(reply.text.contains("lecture.txt"));
}

#[tokio::test]
async fn test_unknown_session_is_an_error() {
    let (mut service, _id, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));

    let bogus = Uuid::new_v4();
    let result = service
        .handle_utterance(&bogus, UserInput::Utterance("hello".to_string()))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (mut service, first, _temp) =
        build_service(Arc::new(MockGenerator { eval: EvalBehavior::Correct }));
    let second = service.create_session();

    upload(&mut service, &first).await;

    assert_eq!(service.session(&first).unwrap().state().documents.len(), 1);
    assert!(service.session(&second).unwrap().state().documents.is_empty());

    // The second session has no indexed material of its own
    let reply = say(&mut service, &second, "start the review").await;
    assert!(reply.text.contains("upload"));
}
