//! Health checks and system/application metrics.

use crate::jobs::{JobQueue, ResultsStore};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueHealth>,
    /// Reasons the service is unhealthy. Field name kept for compatibility
    /// with existing clients.
    #[serde(rename = "query", skip_serializing_if = "Option::is_none")]
    pub problems: Option<Vec<String>>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Tracks the moving parts a health check cares about and samples system
/// counters for the metrics surface.
pub struct Monitoring {
    queue: JobQueue,
    results: ResultsStore,
    worker_alive: Arc<AtomicBool>,
    system: Mutex<System>,
}

impl Monitoring {
    pub fn new(queue: JobQueue, results: ResultsStore, worker_alive: Arc<AtomicBool>) -> Self {
        Self {
            queue,
            results,
            worker_alive,
            system: Mutex::new(System::new_all()),
        }
    }

    /// Healthy means the worker loop is running and the queue can take at
    /// least one more job.
    pub fn health(&self) -> HealthReport {
        let worker_alive = self.worker_alive.load(Ordering::SeqCst);
        let queue_ok = !self.queue.is_full();
        let timestamp = Utc::now().to_rfc3339();

        if worker_alive && queue_ok {
            HealthReport {
                status: "healthy",
                timestamp,
                worker: Some("alive"),
                queue: Some(QueueHealth {
                    size: self.queue.depth(),
                    max_size: self.queue.capacity(),
                }),
                problems: None,
            }
        } else {
            let mut problems = Vec::new();
            if !worker_alive {
                problems.push("Worker thread is not running".to_string());
            }
            if !queue_ok {
                problems.push("Request queue is full".to_string());
            }
            HealthReport {
                status: "unhealthy",
                timestamp,
                worker: None,
                queue: None,
                problems: Some(problems),
            }
        }
    }

    /// Host, process and application counters as one JSON document.
    pub fn metrics(&self) -> Value {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_all();

        let process_memory_mb = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| system.process(pid))
            .map(|p| p.memory() / (1024 * 1024))
            .unwrap_or(0);

        let status_counts = self.results.status_counts();
        let mb: u64 = 1024 * 1024;

        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "hostname": System::host_name().unwrap_or_else(|| "unknown".to_string()),
            "system": {
                "cpu_percent": system.global_cpu_usage(),
                "memory": {
                    "total_mb": system.total_memory() / mb,
                    "available_mb": system.available_memory() / mb,
                    "used_mb": system.used_memory() / mb,
                },
            },
            "process": {
                "memory_mb": process_memory_mb,
            },
            "app": {
                "queue_size": self.queue.depth(),
                "queue_max_size": self.queue.capacity(),
                "results": {
                    "total": self.results.len(),
                    "status": status_counts,
                },
            },
        })
    }
}

/// Log a metrics snapshot on a fixed interval until the process exits.
pub fn spawn_metrics_task(monitoring: Arc<Monitoring>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let snapshot = monitoring.metrics();
            tracing::info!(target: "metrics", %snapshot, "Metrics snapshot");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComparisonJob, ScoringStrategy};
    use uuid::Uuid;

    fn job() -> ComparisonJob {
        ComparisonJob {
            job_id: Uuid::new_v4(),
            submitted_by: "test".to_string(),
            collection: "c".to_string(),
            query: "q".to_string(),
            targets: Vec::new(),
            strategy: ScoringStrategy::Similarity,
        }
    }

    #[tokio::test]
    async fn test_healthy_report() {
        let (queue, _rx) = JobQueue::new(2);
        let monitoring = Monitoring::new(
            queue,
            ResultsStore::new(),
            Arc::new(AtomicBool::new(true)),
        );
        let report = monitoring.health();
        assert!(report.is_healthy());
        assert_eq!(report.queue.as_ref().unwrap().max_size, 2);
        assert!(report.problems.is_none());
    }

    #[tokio::test]
    async fn test_dead_worker_is_unhealthy() {
        let (queue, _rx) = JobQueue::new(2);
        let monitoring = Monitoring::new(
            queue,
            ResultsStore::new(),
            Arc::new(AtomicBool::new(false)),
        );
        let report = monitoring.health();
        assert!(!report.is_healthy());
        let problems = report.problems.unwrap();
        assert!(problems[0].contains("Worker"));
    }

    #[tokio::test]
    async fn test_full_queue_is_unhealthy() {
        let (queue, _rx) = JobQueue::new(1);
        queue.submit(job()).unwrap();
        let monitoring = Monitoring::new(
            queue,
            ResultsStore::new(),
            Arc::new(AtomicBool::new(true)),
        );
        let report = monitoring.health();
        assert!(!report.is_healthy());
        assert!(report.problems.unwrap()[0].contains("queue"));
    }

    #[tokio::test]
    async fn test_unhealthy_reasons_serialize_as_query() {
        let (queue, _rx) = JobQueue::new(1);
        let monitoring = Monitoring::new(
            queue,
            ResultsStore::new(),
            Arc::new(AtomicBool::new(false)),
        );
        let body = serde_json::to_value(monitoring.health()).unwrap();
        assert_eq!(body["status"], "unhealthy");
        assert!(body["query"].is_array());
    }

    #[tokio::test]
    async fn test_metrics_shape() {
        let (queue, _rx) = JobQueue::new(4);
        let results = ResultsStore::new();
        let id = Uuid::new_v4();
        results.insert_queued(id);
        results.complete(id, Vec::new());
        queue.submit(job()).unwrap();

        let monitoring = Monitoring::new(queue, results, Arc::new(AtomicBool::new(true)));
        let metrics = monitoring.metrics();
        assert_eq!(metrics["app"]["queue_size"], 1);
        assert_eq!(metrics["app"]["queue_max_size"], 4);
        assert_eq!(metrics["app"]["results"]["total"], 1);
        assert_eq!(metrics["app"]["results"]["status"]["completed"], 1);
        assert!(metrics["hostname"].is_string());
    }
}
