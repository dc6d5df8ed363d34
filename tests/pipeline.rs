//! End-to-end pipeline tests: CSV bytes in, ranked matches and job results
//! out, with fake embedding and generation capabilities standing in for the
//! external services.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use semimatch::compare;
use semimatch::embedding::Embedder;
use semimatch::ingest;
use semimatch::jobs::{JobQueue, ResultsStore};
use semimatch::models::{ComparisonJob, JobStatus, ScoringStrategy};
use semimatch::monitoring::Monitoring;
use semimatch::rescore::{Rescorer, TextGenerator};
use semimatch::store::{MemoryVectorStore, VectorStore};
use semimatch::worker::{self, WorkerContext};

/// Embeds text as a 2-d vector steered by known keywords, so tests can
/// predict which rows land closest to a query.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                if lower.contains("alice") {
                    vec![1.0, 0.0]
                } else if lower.contains("bob") {
                    vec![0.8, 0.6]
                } else if lower.contains("zara") || lower.contains("nora") {
                    vec![0.0, 1.0]
                } else {
                    vec![0.5, 0.5]
                }
            })
            .collect())
    }

    fn dims(&self) -> usize {
        2
    }
}

struct ScriptedGenerator(&'static str);

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn fixtures() -> (Arc<dyn VectorStore>, Arc<dyn Embedder>) {
    (MemoryVectorStore::shared(), Arc::new(KeywordEmbedder))
}

const PEOPLE_CSV: &[u8] = b"name,age\nAlice,30\nBob,25\nZara,41\n";

#[tokio::test]
async fn csv_rows_become_searchable_units() {
    let (store, embedder) = fixtures();
    let outcome = ingest::ingest_csv(&store, &embedder, "people", PEOPLE_CSV)
        .await
        .unwrap();
    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.total, 3);

    let matches = compare::compare(&store, &embedder, None, "people", "alice")
        .await
        .unwrap();
    assert_eq!(matches.len(), 3);
    assert!(matches[0].content.contains("Alice"));
    assert_eq!(matches[0].metadata["name"], "Alice");
    assert_eq!(matches[0].metadata["age"], "30");
    assert_eq!(matches[0].metadata["row_id"], "1");
    assert!(matches[1].content.contains("Bob"));
    assert!(matches[2].content.contains("Zara"));
    assert!(matches[0].score >= matches[1].score);
    assert!(matches[1].score >= matches[2].score);
    assert_eq!(matches[0].collection, "people");
}

#[tokio::test]
async fn reingesting_the_same_csv_adds_nothing() {
    let (store, embedder) = fixtures();
    ingest::ingest_csv(&store, &embedder, "people", PEOPLE_CSV)
        .await
        .unwrap();
    let second = ingest::ingest_csv(&store, &embedder, "people", PEOPLE_CSV)
        .await
        .unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.total, 3);
}

#[tokio::test]
async fn rescoring_blends_into_the_ranking() {
    let (store, embedder) = fixtures();
    ingest::ingest_csv(&store, &embedder, "people", b"name\nAlice\nNora\n")
        .await
        .unwrap();

    // Alice sits on the query axis, Nora off it; the model inverts that.
    let rescorer = Rescorer::new(Arc::new(ScriptedGenerator(
        "Match 1: 0%\nMatch 2: 100%",
    )));
    let matches = compare::compare(&store, &embedder, Some(&rescorer), "people", "alice")
        .await
        .unwrap();
    assert_eq!(matches[0].content, "name: Nora");
    assert!(matches[0].score > matches[1].score);
}

#[tokio::test]
async fn async_job_reaches_completed_through_the_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let (store, embedder) = fixtures();
    ingest::ingest_csv(&store, &embedder, "people", PEOPLE_CSV)
        .await
        .unwrap();

    let (queue, rx) = JobQueue::new(4);
    let results = ResultsStore::new();
    let (handle, alive) = worker::spawn(
        WorkerContext {
            store,
            embedder,
            rescorer: None,
            results: results.clone(),
            data_dir: tmp.path().to_path_buf(),
        },
        rx,
    );

    let monitoring = Monitoring::new(queue.clone(), results.clone(), alive.clone());
    assert!(monitoring.health().is_healthy());

    let job_id = Uuid::new_v4();
    results.insert_queued(job_id);
    assert_eq!(results.get(job_id).unwrap().status, JobStatus::Queued);

    queue
        .submit(ComparisonJob {
            job_id,
            submitted_by: "it".to_string(),
            collection: "people".to_string(),
            query: "alice".to_string(),
            targets: Vec::new(),
            strategy: ScoringStrategy::Similarity,
        })
        .unwrap();

    queue.shutdown().await.unwrap();
    handle.await.unwrap();

    let result = results.get(job_id).unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.progress, 100);
    assert_eq!(result.top_matches.len(), 3);

    // audit export landed next to the data dir
    let audit = tmp
        .path()
        .join("search_results")
        .join(format!("top_matches_{}.csv", job_id));
    assert!(audit.exists());

    // and once the worker is gone, health flips
    assert!(!alive.load(Ordering::SeqCst));
    assert!(!monitoring.health().is_healthy());
}

#[tokio::test]
async fn full_queue_pushes_back() {
    let (queue, _rx) = JobQueue::new(1);
    let job = |id| ComparisonJob {
        job_id: id,
        submitted_by: "it".to_string(),
        collection: "people".to_string(),
        query: "q".to_string(),
        targets: Vec::new(),
        strategy: ScoringStrategy::Similarity,
    };

    queue.submit(job(Uuid::new_v4())).unwrap();
    assert!(queue.submit(job(Uuid::new_v4())).is_err());
}

#[tokio::test]
async fn top_matches_never_exceed_five() {
    let (store, embedder) = fixtures();
    let csv = b"name\nAlice\nBea\nCleo\nDan\nEve\nFay\nGus\n";
    ingest::ingest_csv(&store, &embedder, "people", &csv[..])
        .await
        .unwrap();

    let matches = compare::compare(&store, &embedder, None, "people", "a")
        .await
        .unwrap();
    assert_eq!(matches.len(), 5);
}
