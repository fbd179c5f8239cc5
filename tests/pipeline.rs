//! End-to-end tests of the request pipeline over the in-memory store and
//! deterministic fake services.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use easy_research::pipeline::{AskOptions, PipelineSettings};
use easy_research::workspace::{self, FileStatus};
use easy_research_core::generation::SharedGenerator;
use easy_research_core::ingest::{ingest_document, DEFAULT_BATCH_SIZE};
use easy_research_core::models::{SourceDocument, Turn, NOT_FOUND_ANSWER};
use easy_research_core::retrieve::RetrievalStrategy;
use easy_research_core::store::memory::InMemoryStore;

async fn seed(store: &InMemoryStore) {
    for (name, text) in [("refunds.txt", REFUNDS), ("shipping.txt", SHIPPING)] {
        ingest_document(
            &HashEmbedder,
            store,
            "policies",
            &SourceDocument::new(name, text),
            DEFAULT_BATCH_SIZE,
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_empty_workspace_answers_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(store, generator.clone());

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;

    assert!(response.is_not_found());
    assert_eq!(response.answer, NOT_FOUND_ANSWER);
    assert!(response.sources.is_empty());
    assert_eq!(response.diagnostics.retrieved, 0);
    assert_eq!(response.diagnostics.used, 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_answer_cites_relevant_source() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(store, generator.clone());

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;

    assert_eq!(response.answer, ANSWER);
    assert_eq!(response.sources, vec!["refunds.txt".to_string()]);
    assert_eq!(response.diagnostics.retrieved, 2);
    assert_eq!(response.diagnostics.used, 1);
    assert_eq!(response.diagnostics.strategy, "standard");
    assert!(!response.diagnostics.contextualized);
    assert!(response.diagnostics.warnings.is_empty());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_unmatched_question_falls_back_to_all_candidates() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline(store, Arc::new(ScriptedGenerator::default()));

    let response = pipeline
        .ask("policies", "zebra xylophone", &[], &AskOptions::default())
        .await;

    assert_eq!(response.diagnostics.retrieved, 2);
    assert_eq!(response.diagnostics.used, 2);
    assert_eq!(response.sources.len(), 2);
}

#[tokio::test]
async fn test_k_override_limits_candidates() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline(store, Arc::new(ScriptedGenerator::default()));
    let options = AskOptions {
        k: Some(1),
        ..Default::default()
    };

    let response = pipeline
        .ask("policies", "zebra xylophone", &[], &options)
        .await;

    assert_eq!(response.diagnostics.retrieved, 2);
    assert_eq!(response.diagnostics.used, 1);
}

#[tokio::test]
async fn test_first_question_is_not_rewritten() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(store, generator.clone());

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;
    assert!(!response.diagnostics.contextualization_attempted);
    assert!(!response.diagnostics.contextualized);
    assert_eq!(
        response.diagnostics.standalone_question,
        "What is the refund policy?"
    );

    // A self-contained question after an exchange is left alone as well.
    let response = pipeline
        .ask(
            "policies",
            "How long does shipping take?",
            &refund_history(),
            &AskOptions::default(),
        )
        .await;
    assert!(!response.diagnostics.contextualized);
    assert!(generator
        .systems
        .lock()
        .unwrap()
        .iter()
        .all(|s| !s.contains("standalone question")));
}

#[tokio::test]
async fn test_follow_up_is_rewritten_from_history() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline(store, Arc::new(ScriptedGenerator::default()));

    let response = pipeline
        .ask(
            "policies",
            "And for international orders?",
            &refund_history(),
            &AskOptions::default(),
        )
        .await;

    assert!(response.diagnostics.contextualization_attempted);
    assert!(response.diagnostics.contextualized);
    let standalone = response.diagnostics.standalone_question.to_lowercase();
    assert!(standalone.contains("refund"));
    assert!(!standalone.starts_with('"'));
    assert!(response.sources.contains(&"refunds.txt".to_string()));
}

#[tokio::test]
async fn test_rewrite_failure_uses_raw_question() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator {
        fail_rewrite: true,
        ..Default::default()
    });
    let pipeline = pipeline(store, generator);

    let response = pipeline
        .ask(
            "policies",
            "And for international orders?",
            &refund_history(),
            &AskOptions::default(),
        )
        .await;

    assert!(response.diagnostics.contextualization_attempted);
    assert!(!response.diagnostics.contextualized);
    assert_eq!(
        response.diagnostics.standalone_question,
        "And for international orders?"
    );
    assert_eq!(response.diagnostics.warnings.len(), 1);
    assert_eq!(response.answer, ANSWER);
}

#[tokio::test]
async fn test_hypothetical_strategy() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(store, generator.clone());
    let options = AskOptions {
        strategy: Some(RetrievalStrategy::HypotheticalDocument),
        ..Default::default()
    };

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &options)
        .await;

    assert_eq!(response.diagnostics.strategy, "hypothetical");
    assert_eq!(response.sources, vec!["refunds.txt".to_string()]);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_dropped_workspace_is_not_retrievable() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline(store.clone(), Arc::new(ScriptedGenerator::default()));

    assert!(workspace::drop_workspace(store.as_ref(), "policies")
        .await
        .unwrap());
    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;

    assert!(response.is_not_found());
    assert!(!workspace::list(store.as_ref())
        .await
        .unwrap()
        .contains(&"policies".to_string()));
}

#[tokio::test]
async fn test_removed_file_is_not_retrievable() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline(store.clone(), Arc::new(ScriptedGenerator::default()));

    let removed = workspace::remove_file(store.as_ref(), "policies", "refunds.txt")
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;
    assert_eq!(response.sources, vec!["shipping.txt".to_string()]);
}

#[tokio::test]
async fn test_reingest_does_not_grow_workspace() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let before = store.len("policies");
    seed(&store).await;
    assert_eq!(store.len("policies"), before);
}

#[tokio::test]
async fn test_missing_credential_short_circuits() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let pipeline = pipeline_with(store, Arc::new(NoCredential), PipelineSettings::default());

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;

    assert!(response.answer.contains("GROQ_API_KEY"));
    assert!(response.sources.is_empty());
    assert_eq!(response.diagnostics.retrieved, 0);
    assert!(!response.is_not_found());
}

#[tokio::test]
async fn test_slow_generation_times_out() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator {
        answer_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let settings = PipelineSettings {
        stage_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let pipeline = pipeline_with(store, Arc::new(SharedGenerator(generator)), settings);

    let response = pipeline
        .ask("policies", "What is the refund policy?", &[], &AskOptions::default())
        .await;

    assert!(response.answer.starts_with("Error while calling scripted"));
    assert_eq!(response.sources, vec!["refunds.txt".to_string()]);
    assert_eq!(response.diagnostics.used, 1);
    assert!(response
        .diagnostics
        .warnings
        .iter()
        .any(|w| w == "answer generation failed"));
}

#[tokio::test]
async fn test_history_is_passed_to_synthesis() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(store, generator.clone());
    let history = vec![
        Turn::user("Hi"),
        Turn::assistant("Hello, ask me about the policies."),
    ];

    pipeline
        .ask(
            "policies",
            "What is the refund policy?",
            &history,
            &AskOptions::default(),
        )
        .await;

    let systems = generator.systems.lock().unwrap();
    let answer_system = systems.last().unwrap();
    assert!(answer_system.contains("User: Hi"));
    assert!(answer_system.contains("Assistant: Hello, ask me about the policies."));
}

#[tokio::test]
async fn test_ingest_paths_reports_each_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("refunds.txt"), REFUNDS).unwrap();
    std::fs::write(dir.path().join("empty.md"), "   \n").unwrap();
    std::fs::write(dir.path().join("broken.txt"), [0xff, 0xfe, 0xfd]).unwrap();
    let store = InMemoryStore::new();

    let reports = workspace::ingest_paths(
        &HashEmbedder,
        &store,
        "docs",
        &[dir.path().to_path_buf()],
        DEFAULT_BATCH_SIZE,
    )
    .await;

    assert_eq!(reports.len(), 3);
    let status = |name: &str| {
        reports
            .iter()
            .find(|r| r.path.ends_with(name))
            .map(|r| r.status)
            .unwrap()
    };
    assert_eq!(status("refunds.txt"), FileStatus::Indexed);
    assert_eq!(status("empty.md"), FileStatus::Skipped);
    assert_eq!(status("broken.txt"), FileStatus::Failed);
    assert_eq!(store.len("docs"), 1);

    let stats = workspace::stats(&store, "docs", DIMS).await.unwrap();
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.files, 1);
}

#[tokio::test]
async fn test_summarize_workspace() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generators = SharedGenerator(Arc::new(ScriptedGenerator::default()));

    let summary = workspace::summarize(&generators, store.as_ref(), "policies", None)
        .await
        .unwrap();
    assert_eq!(summary, "Overview: refunds and shipping.");

    assert!(workspace::summarize(&NoCredential, store.as_ref(), "policies", None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_total_size_spans_workspaces() {
    let store = InMemoryStore::new();
    assert!(workspace::all_stats(&store, DIMS).await.unwrap().is_empty());
    assert_eq!(workspace::total_size_mb(&[]), 0.0);

    seed(&store).await;
    ingest_document(
        &HashEmbedder,
        &store,
        "archive",
        &SourceDocument::new("refunds.txt", REFUNDS),
        DEFAULT_BATCH_SIZE,
    )
    .await
    .unwrap();

    let all = workspace::all_stats(&store, DIMS).await.unwrap();
    let names: Vec<&str> = all.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["archive", "policies"]);
    assert_eq!(all[0].1.files, 1);
    assert_eq!(all[1].1.files, 2);

    let total = workspace::total_size_mb(&all);
    let policies = workspace::stats(&store, "policies", DIMS).await.unwrap();
    let archive = workspace::stats(&store, "archive", DIMS).await.unwrap();
    assert!((total - (policies.size_mb + archive.size_mb)).abs() < 1e-12);
    assert!(total > policies.size_mb);
}
