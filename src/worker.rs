//! The single background worker that consumes the job queue.
//!
//! Jobs run strictly one at a time in submission order. Each finished job
//! writes an audit CSV of its top matches under the data directory before
//! its result is marked terminal.

use crate::compare::{self, CompareError};
use crate::embedding::Embedder;
use crate::jobs::{JobRequest, ResultsStore};
use crate::models::{content_id, ComparisonJob, Match};
use crate::rescore::Rescorer;
use crate::store::VectorStore;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything a worker needs to run jobs.
pub struct WorkerContext {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub rescorer: Option<Arc<Rescorer>>,
    pub results: ResultsStore,
    pub data_dir: PathBuf,
}

/// Spawn the worker task. The returned flag stays true while the loop runs
/// and flips to false on any exit path, so health checks can notice a dead
/// worker.
pub fn spawn(
    ctx: WorkerContext,
    mut rx: mpsc::Receiver<JobRequest>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let alive = Arc::new(AtomicBool::new(true));
    let alive_flag = alive.clone();

    let handle = tokio::spawn(async move {
        tracing::info!("Worker started");
        while let Some(request) = rx.recv().await {
            match request {
                JobRequest::Process(job) => {
                    let job_id = job.job_id;
                    tracing::info!(%job_id, collection = %job.collection, "Processing job");
                    ctx.results.mark_processing(job_id);
                    match run_job(&ctx, &job).await {
                        Ok(matches) => {
                            ctx.results.complete(job_id, matches);
                            tracing::info!(%job_id, "Job completed");
                        }
                        Err(e) => {
                            tracing::error!(%job_id, error = %e, "Job failed");
                            ctx.results.fail(job_id, e.to_string());
                        }
                    }
                }
                JobRequest::Shutdown => {
                    tracing::info!("Worker received shutdown");
                    break;
                }
            }
        }
        alive_flag.store(false, Ordering::SeqCst);
        tracing::info!("Worker stopped");
    });

    (handle, alive)
}

async fn run_job(ctx: &WorkerContext, job: &ComparisonJob) -> Result<Vec<Match>> {
    let matches = match job.strategy {
        crate::models::ScoringStrategy::Similarity => similarity_job(ctx, job).await?,
        crate::models::ScoringStrategy::PairwiseLlm => pairwise_job(ctx, job).await?,
    };

    write_audit_csv(&ctx.data_dir, job, &matches)
        .with_context(|| format!("Failed to write audit export for job {}", job.job_id))?;
    Ok(matches)
}

async fn similarity_job(ctx: &WorkerContext, job: &ComparisonJob) -> Result<Vec<Match>> {
    let matches = compare::compare(
        &ctx.store,
        &ctx.embedder,
        ctx.rescorer.as_deref(),
        &job.collection,
        &job.query,
    )
    .await
    .map_err(|e| match e {
        CompareError::CollectionNotFound(name) => {
            anyhow::anyhow!("Collection '{}' not found", name)
        }
        CompareError::Scoring(e) => e,
    })?;
    ctx.results.set_progress(job.job_id, 100);
    Ok(matches)
}

/// Score each explicit target against the query, one model call per target,
/// reporting progress as targets finish.
async fn pairwise_job(ctx: &WorkerContext, job: &ComparisonJob) -> Result<Vec<Match>> {
    let rescorer = ctx
        .rescorer
        .as_ref()
        .context("Pairwise scoring requires a configured rescoring provider")?;

    let total = job.targets.len();
    if total == 0 {
        ctx.results.set_progress(job.job_id, 100);
        return Ok(Vec::new());
    }

    let mut matches = Vec::with_capacity(total);
    for (i, target) in job.targets.iter().enumerate() {
        let score = rescorer.pairwise(&job.query, target).await?;
        matches.push(Match {
            id: content_id(target),
            content: target.clone(),
            metadata: BTreeMap::new(),
            score,
            collection: job.collection.clone(),
        });
        let progress = (100 * (i + 1) / total) as u8;
        ctx.results.set_progress(job.job_id, progress);
    }

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(compare::TOP_K);
    Ok(matches)
}

/// Durable record of a job's outcome, one row per match.
fn write_audit_csv(data_dir: &Path, job: &ComparisonJob, matches: &[Match]) -> Result<()> {
    let dir = data_dir.join("search_results");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(format!("top_matches_{}.csv", job.job_id));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    writer.write_record(["rank", "match_id", "score", "collection", "content"])?;
    for (i, m) in matches.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string(),
            m.id.clone(),
            format!("{:.6}", m.score),
            m.collection.clone(),
            m.content.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
