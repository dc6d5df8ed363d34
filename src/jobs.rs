//! Bounded job queue and shared results map.

use crate::models::{ComparisonJob, JobResult, JobStatus};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
pub enum JobRequest {
    Process(Box<ComparisonJob>),
    Shutdown,
}

/// Submission side of the worker channel. Capacity is fixed at construction;
/// a full queue rejects immediately instead of blocking the submitter.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobRequest>,
    capacity: usize,
}

/// Queue rejected a submission because it is at capacity.
#[derive(Debug)]
pub struct QueueFull;

impl std::fmt::Display for QueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job queue is full")
    }
}

impl std::error::Error for QueueFull {}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JobRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn submit(&self, job: ComparisonJob) -> Result<(), QueueFull> {
        self.tx
            .try_send(JobRequest::Process(Box::new(job)))
            .map_err(|_| QueueFull)
    }

    /// Ask the worker to exit once it drains everything queued before this.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(JobRequest::Shutdown)
            .await
            .map_err(|_| anyhow!("Worker channel closed"))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently waiting in the channel.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }
}

/// Results of submitted jobs, keyed by job id. One mutex over the whole map;
/// nothing holds it across an await.
#[derive(Clone, Default)]
pub struct ResultsStore {
    inner: Arc<Mutex<HashMap<Uuid, JobResult>>>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JobResult>> {
        // a poisoned map means a panic mid-update; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_queued(&self, job_id: Uuid) {
        self.lock().insert(job_id, JobResult::queued());
    }

    pub fn mark_processing(&self, job_id: Uuid) {
        let mut map = self.lock();
        if let Some(result) = map.get_mut(&job_id) {
            if !result.status.is_terminal() {
                result.status = JobStatus::Processing;
            }
        }
    }

    /// Raise a running job's progress. Never lowers it, never touches a
    /// terminal entry.
    pub fn set_progress(&self, job_id: Uuid, progress: u8) {
        let mut map = self.lock();
        if let Some(result) = map.get_mut(&job_id) {
            if !result.status.is_terminal() && progress > result.progress {
                result.progress = progress.min(100);
            }
        }
    }

    pub fn complete(&self, job_id: Uuid, top_matches: Vec<crate::models::Match>) {
        let mut map = self.lock();
        if let Some(result) = map.get_mut(&job_id) {
            if !result.status.is_terminal() {
                result.status = JobStatus::Completed;
                result.progress = 100;
                result.top_matches = top_matches;
                result.error = None;
            }
        }
    }

    pub fn fail(&self, job_id: Uuid, error: String) {
        let mut map = self.lock();
        if let Some(result) = map.get_mut(&job_id) {
            if !result.status.is_terminal() {
                result.status = JobStatus::Failed;
                result.progress = 100;
                result.error = Some(error);
            }
        }
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobResult> {
        self.lock().get(&job_id).cloned()
    }

    /// Drop a job's entry, for rolling back a submission the queue refused.
    pub fn remove(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of jobs per status, for the metrics surface.
    pub fn status_counts(&self) -> HashMap<&'static str, usize> {
        let map = self.lock();
        let mut counts = HashMap::new();
        for result in map.values() {
            *counts.entry(result.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}
