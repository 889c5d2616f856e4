//! End-to-end chat tests: upload, re-upload, chat turns and export.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{FailingSynthesizer, RecordingSynthesizer, UnavailableEmbedder, extractive_chat};
use doctalk_rag::{Document, EmbeddingProvider, HashingEmbedder, RagError, RetrievalMode};
use doctalk_session::{DocChat, ExtractiveSynthesizer, SessionConfig, SessionError};
use tokio::sync::Notify;
use tokio::task::JoinSet;

fn geography() -> Document {
    Document::new("geo.txt", "Paris is the capital of France.")
}

fn cats() -> Document {
    Document::new("cats.txt", "Cats sleep sixteen hours a day and purr when content.")
}

fn recording_chat(synthesizer: Arc<RecordingSynthesizer>) -> DocChat {
    DocChat::builder()
        .embedder(Arc::new(HashingEmbedder::default()))
        .synthesizer(synthesizer)
        .build()
        .unwrap()
}

/// Delegates to [`HashingEmbedder`] until switched off.
struct SwitchableEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    async fn embed(&self, text: &str) -> doctalk_rag::Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::embedding("Switchable", "switched off"));
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Pauses the first embedding call after being armed until released.
struct GatedEmbedder {
    inner: HashingEmbedder,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedEmbedder {
    fn new() -> Self {
        Self {
            inner: HashingEmbedder::default(),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> doctalk_rag::Result<Vec<f32>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

fn gated_chat(embedder: Arc<GatedEmbedder>, ttl: Duration) -> Arc<DocChat> {
    Arc::new(
        DocChat::builder()
            .session_config(SessionConfig::builder().ttl(ttl).build().unwrap())
            .embedder(embedder)
            .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn upload_then_question_cites_the_matching_file() {
    let chat = extractive_chat();

    let receipt = chat.upload(vec![geography(), cats()]).await.unwrap();
    assert_eq!(receipt.processed_files, vec!["geo.txt", "cats.txt"]);
    assert_eq!(receipt.chunk_count, 2);

    let reply = chat.chat(&receipt.session_id, "What is the capital of France?").await.unwrap();

    assert_eq!(reply.mode, RetrievalMode::Question);
    assert!(reply.answer.starts_with("According to geo.txt, Paris is the capital"));
    assert!(reply.sources.contains(&"geo.txt".to_string()));
    let mut sorted = reply.sources.clone();
    sorted.sort();
    assert_eq!(reply.sources, sorted);

    let snapshot = chat.snapshot(&receipt.session_id).await.unwrap();
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].user_text, "What is the capital of France?");
    assert_eq!(snapshot.history[0].assistant_text, reply.answer);
}

#[tokio::test]
async fn duplicate_ids_are_reported_once() {
    let chat = extractive_chat();

    let receipt = chat
        .upload(vec![geography(), cats(), Document::new("geo.txt", "Lyon is in France.")])
        .await
        .unwrap();

    assert_eq!(receipt.processed_files, vec!["geo.txt", "cats.txt"]);
    assert_eq!(receipt.chunk_count, 2);
}

#[tokio::test]
async fn failed_upload_leaves_no_session() {
    let chat = DocChat::builder()
        .embedder(Arc::new(UnavailableEmbedder))
        .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
        .build()
        .unwrap();

    let err = chat.upload(vec![geography()]).await.unwrap_err();

    assert!(matches!(err, SessionError::Rag(RagError::Embedding { .. })));
    assert!(chat.store().is_empty().await);
}

#[tokio::test]
async fn upload_without_text_is_rejected() {
    let chat = extractive_chat();
    let err = chat.upload(vec![Document::new("scan.pdf", "")]).await.unwrap_err();
    assert!(matches!(err, SessionError::Rag(RagError::EmptyIndex)));
}

#[tokio::test]
async fn chat_before_upload_reports_no_documents() {
    let chat = extractive_chat();
    let session_id = chat.store().create().await;

    let err = chat.chat(&session_id, "hello?").await.unwrap_err();

    assert!(matches!(err, SessionError::NoDocuments(ref id) if *id == session_id));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn chat_with_unknown_session_is_not_found() {
    let chat = extractive_chat();
    let err = chat.chat("nope", "hello?").await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn reupload_replaces_the_index_and_keeps_history() {
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let chat = recording_chat(Arc::clone(&synthesizer));
    let receipt = chat.upload(vec![geography()]).await.unwrap();
    chat.chat(&receipt.session_id, "capital of France?").await.unwrap();

    let replaced = chat.reupload(&receipt.session_id, vec![cats()]).await.unwrap();
    assert_eq!(replaced.session_id, receipt.session_id);
    assert_eq!(replaced.processed_files, vec!["cats.txt"]);

    let reply = chat.chat(&receipt.session_id, "capital of France?").await.unwrap();

    assert_eq!(reply.sources, vec!["cats.txt"]);
    let calls = synthesizer.calls();
    assert!(calls[1].context.iter().all(|p| p.source_id == "cats.txt"));
    assert_eq!(calls[1].history.len(), 1);

    let snapshot = chat.snapshot(&receipt.session_id).await.unwrap();
    assert_eq!(snapshot.document_names, vec!["cats.txt"]);
    assert_eq!(snapshot.history.len(), 2);
}

#[tokio::test]
async fn failed_reupload_keeps_the_previous_index() {
    let embedder = Arc::new(SwitchableEmbedder {
        inner: HashingEmbedder::default(),
        failing: AtomicBool::new(false),
    });
    let chat = DocChat::builder()
        .embedder(embedder.clone())
        .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
        .build()
        .unwrap();
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    embedder.failing.store(true, Ordering::SeqCst);
    let err = chat.reupload(&receipt.session_id, vec![cats()]).await.unwrap_err();
    assert!(matches!(err, SessionError::Rag(RagError::Embedding { .. })));
    let err = chat.reupload(&receipt.session_id, Vec::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::Rag(RagError::EmptyIndex)));

    embedder.failing.store(false, Ordering::SeqCst);
    let reply = chat.chat(&receipt.session_id, "capital of France?").await.unwrap();
    assert_eq!(reply.sources, vec!["geo.txt"]);
    let snapshot = chat.snapshot(&receipt.session_id).await.unwrap();
    assert_eq!(snapshot.document_names, vec!["geo.txt"]);
}

#[tokio::test]
async fn synthesizer_sees_only_the_recent_history_window() {
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let chat = recording_chat(Arc::clone(&synthesizer));
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    for i in 0..7 {
        chat.chat(&receipt.session_id, &format!("question {i}")).await.unwrap();
    }

    let calls = synthesizer.calls();
    assert_eq!(calls.len(), 7);
    assert!(calls[0].history.is_empty());
    assert_eq!(calls[3].history.len(), 3);
    let last = &calls[6].history;
    assert_eq!(last.len(), 5);
    assert_eq!(last[0].user_text, "question 1");
    assert_eq!(last[0].assistant_text, "answer 2");
    assert_eq!(last[4].user_text, "question 5");
}

#[tokio::test]
async fn history_window_is_configurable() {
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let chat = DocChat::builder()
        .session_config(SessionConfig::builder().history_window(1).build().unwrap())
        .embedder(Arc::new(HashingEmbedder::default()))
        .synthesizer(synthesizer.clone())
        .build()
        .unwrap();
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    for i in 0..3 {
        chat.chat(&receipt.session_id, &format!("question {i}")).await.unwrap();
    }

    let calls = synthesizer.calls();
    assert_eq!(calls[2].history.len(), 1);
    assert_eq!(calls[2].history[0].user_text, "question 1");
}

#[tokio::test]
async fn failed_synthesis_records_no_turn() {
    let chat = DocChat::builder()
        .embedder(Arc::new(HashingEmbedder::default()))
        .synthesizer(Arc::new(FailingSynthesizer))
        .build()
        .unwrap();
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    let err = chat.chat(&receipt.session_id, "capital?").await.unwrap_err();

    assert!(matches!(err, SessionError::Synthesis { .. }));
    assert!(chat.snapshot(&receipt.session_id).await.unwrap().history.is_empty());
}

#[tokio::test]
async fn summary_requests_cover_every_file() {
    let chat = extractive_chat();
    let receipt = chat
        .upload(vec![geography(), cats(), Document::new("birds.txt", "Swifts can fly for months.")])
        .await
        .unwrap();

    let reply = chat.chat(&receipt.session_id, "Give me a summary of everything").await.unwrap();

    assert_eq!(reply.mode, RetrievalMode::Summary);
    assert_eq!(reply.sources, vec!["birds.txt", "cats.txt", "geo.txt"]);
    assert!(reply.answer.starts_with("# Summary of Uploaded Documents"));
    assert!(reply.answer.contains("## birds.txt"));
}

#[tokio::test]
async fn snapshot_reflects_session_state_and_serializes() {
    let chat = extractive_chat();
    let receipt = chat.upload(vec![geography(), cats()]).await.unwrap();
    chat.chat(&receipt.session_id, "How long do cats sleep?").await.unwrap();

    let snapshot = chat.snapshot(&receipt.session_id).await.unwrap();

    assert_eq!(snapshot.id, receipt.session_id);
    assert!(snapshot.ready);
    assert_eq!(snapshot.document_names, vec!["geo.txt", "cats.txt"]);
    assert!(snapshot.last_accessed_at > snapshot.created_at);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["last_accessed_at"].is_string());
    assert_eq!(json["history"][0]["user_text"], "How long do cats sleep?");
    assert!(json["history"][0]["sources"].as_array().is_some());
}

#[tokio::test]
async fn ended_sessions_are_gone() {
    let chat = extractive_chat();
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    chat.end_session(&receipt.session_id).await;
    chat.end_session(&receipt.session_id).await;

    assert!(matches!(
        chat.snapshot(&receipt.session_id).await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_expire_between_turns() {
    let chat = DocChat::builder()
        .session_config(SessionConfig::builder().ttl(Duration::from_secs(60)).build().unwrap())
        .embedder(Arc::new(HashingEmbedder::default()))
        .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
        .build()
        .unwrap();
    let receipt = chat.upload(vec![geography()]).await.unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;

    let err = chat.chat(&receipt.session_id, "capital?").await.unwrap_err();
    assert!(matches!(err, SessionError::Expired(_)));
}

#[test]
fn builder_requires_embedder_and_synthesizer() {
    let missing_embedder =
        DocChat::builder().synthesizer(Arc::new(ExtractiveSynthesizer::new())).build();
    assert!(matches!(missing_embedder, Err(SessionError::Config(_))));

    let missing_synthesizer = DocChat::builder().embedder(Arc::new(HashingEmbedder::default())).build();
    assert!(matches!(missing_synthesizer, Err(SessionError::Config(_))));
}

#[tokio::test]
async fn reupload_into_a_session_ended_during_indexing_fails() {
    let embedder = Arc::new(GatedEmbedder::new());
    let chat = gated_chat(Arc::clone(&embedder), Duration::from_secs(60));
    let receipt = chat.upload(vec![geography()]).await.unwrap();
    let session_id = receipt.session_id.clone();

    embedder.armed.store(true, Ordering::SeqCst);
    let task = tokio::spawn({
        let chat = Arc::clone(&chat);
        let session_id = session_id.clone();
        async move { chat.reupload(&session_id, vec![cats()]).await }
    });
    embedder.entered.notified().await;
    chat.end_session(&session_id).await;
    embedder.release.notify_one();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::NotFound(ref id) if *id == session_id));
    assert!(!chat.store().contains(&session_id).await);
}

#[tokio::test(start_paused = true)]
async fn reupload_into_a_session_expired_during_indexing_fails() {
    let embedder = Arc::new(GatedEmbedder::new());
    let chat = gated_chat(Arc::clone(&embedder), Duration::from_secs(60));
    let receipt = chat.upload(vec![geography()]).await.unwrap();
    let session_id = receipt.session_id.clone();

    embedder.armed.store(true, Ordering::SeqCst);
    let task = tokio::spawn({
        let chat = Arc::clone(&chat);
        let session_id = session_id.clone();
        async move { chat.reupload(&session_id, vec![cats()]).await }
    });
    embedder.entered.notified().await;
    tokio::time::advance(Duration::from_secs(61)).await;
    embedder.release.notify_one();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Expired(_)));
    assert!(!chat.store().contains(&session_id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_turns_on_one_session_are_all_recorded() {
    let chat = Arc::new(extractive_chat());
    let receipt = chat.upload(vec![geography(), cats()]).await.unwrap();

    let mut tasks = JoinSet::new();
    for worker in 0..8 {
        let chat = Arc::clone(&chat);
        let session_id = receipt.session_id.clone();
        tasks.spawn(async move {
            for turn in 0..5 {
                chat.chat(&session_id, &format!("worker {worker} turn {turn}: capital?"))
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(done) = tasks.join_next().await {
        done.unwrap();
    }

    let history = chat.snapshot(&receipt.session_id).await.unwrap().history;
    assert_eq!(history.len(), 40);
    let questions: HashSet<&str> = history.iter().map(|t| t.user_text.as_str()).collect();
    assert_eq!(questions.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_stay_isolated() {
    let chat = Arc::new(extractive_chat());

    let mut tasks = JoinSet::new();
    for n in 0..16 {
        let chat = Arc::clone(&chat);
        tasks.spawn(async move {
            let file = format!("doc{n}.txt");
            let receipt = chat
                .upload(vec![Document::new(file.clone(), format!("Document {n} talks about topic {n}."))])
                .await
                .unwrap();
            for turn in 0..3 {
                let reply = chat.chat(&receipt.session_id, &format!("topic {n} turn {turn}")).await.unwrap();
                assert_eq!(reply.sources, vec![file.clone()]);
            }
            if n % 2 == 0 {
                chat.end_session(&receipt.session_id).await;
            }
            (n, receipt.session_id)
        });
    }

    let mut ids = HashSet::new();
    let mut kept = Vec::new();
    while let Some(result) = tasks.join_next().await {
        let (n, session_id) = result.unwrap();
        assert!(ids.insert(session_id.clone()), "duplicate session id");
        if n % 2 == 1 {
            kept.push(session_id);
        }
    }

    assert_eq!(chat.store().len().await, 8);
    for session_id in &kept {
        let snapshot = chat.snapshot(session_id).await.unwrap();
        assert_eq!(snapshot.history.len(), 3);
        assert_eq!(snapshot.document_names.len(), 1);
    }
}
