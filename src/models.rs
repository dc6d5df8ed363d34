//! Core data types used throughout semimatch.
//!
//! These types represent the content units, collections, matches, and
//! comparison jobs that flow through the ingestion and scoring pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Number of hex characters kept from the content hash. Long enough to make
/// collisions negligible for realistic corpus sizes, short enough to stay
/// readable in logs and exports.
const CONTENT_ID_LEN: usize = 16;

/// Compute the content-addressed identifier for a piece of text.
///
/// Two identical texts always receive the same id, which is what makes
/// re-ingestion idempotent.
pub fn content_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..CONTENT_ID_LEN].to_string()
}

/// A normalized, content-addressed unit of text plus metadata — the atomic
/// thing stored in and searched from a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentUnit {
    pub id: String,
    pub text: String,
    /// `BTreeMap` so metadata serializes in a stable key order.
    pub metadata: BTreeMap<String, String>,
}

impl ContentUnit {
    /// Build a unit from text and metadata. The id is derived from the text,
    /// never supplied by the caller.
    pub fn new(text: String, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: content_id(&text),
            text,
            metadata,
        }
    }
}

/// Provenance tag recorded on a collection at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Rows ingested from a delimited table.
    Tabular,
    /// Fragments extracted from an uploaded document.
    DocumentProblems,
}

impl CollectionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Tabular => "tabular",
            CollectionKind::DocumentProblems => "document-problems",
        }
    }
}

/// Collection-level metadata. The similarity metric is fixed at creation and
/// is always cosine in this implementation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: &'static str,
    pub kind: CollectionKind,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            metric: "cosine",
            kind,
        }
    }
}

/// A stored unit plus its similarity to a query, as returned by
/// [`VectorStore::query`](crate::store::VectorStore::query). Scores are
/// oriented so that higher means more similar.
#[derive(Debug, Clone)]
pub struct ScoredUnit {
    pub unit: ContentUnit,
    pub score: f64,
}

/// A ranked result produced by the query engine. Wire field names follow the
/// established frontend contract (`match` for the score, `project_name` for
/// the collection).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "match")]
    pub score: f64,
    #[serde(rename = "project_name")]
    pub collection: String,
}

/// How the worker scores a comparison job. Resolved once at enqueue time so
/// the worker never inspects the payload to decide what to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Run the similarity query engine against the named collection.
    Similarity,
    /// Score each target content item pairwise with the text-generation
    /// capability.
    PairwiseLlm,
}

/// A unit of asynchronous comparison work, consumed exactly once by the
/// background worker.
#[derive(Debug, Clone)]
pub struct ComparisonJob {
    pub job_id: Uuid,
    pub submitted_by: String,
    pub collection: String,
    pub query: String,
    /// Target contents for [`ScoringStrategy::PairwiseLlm`], processed in the
    /// order given. Empty for the similarity strategy.
    pub targets: Vec<String>,
    pub strategy: ScoringStrategy,
}

/// Job lifecycle states. Transitions only move forward:
/// `Queued → Processing → {Completed, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// The externally visible state of a job, returned verbatim by the status
/// endpoint. `progress` is monotonically non-decreasing for a given job and
/// the whole entry is immutable once the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub status: JobStatus,
    pub progress: u8,
    pub top_matches: Vec<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            top_matches: Vec::new(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_deterministic() {
        let a = content_id("name: Alice\nage: 30");
        let b = content_id("name: Alice\nage: 30");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_content_id_differs_for_different_text() {
        assert_ne!(content_id("alpha"), content_id("beta"));
    }

    #[test]
    fn test_unit_id_from_text_only() {
        let mut meta_a = BTreeMap::new();
        meta_a.insert("page".to_string(), "1".to_string());
        let mut meta_b = BTreeMap::new();
        meta_b.insert("page".to_string(), "7".to_string());

        let a = ContentUnit::new("same text".to_string(), meta_a);
        let b = ContentUnit::new("same text".to_string(), meta_b);
        assert_eq!(
            a.id, b.id,
            "identity is content-addressed, metadata-independent"
        );
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_match_wire_names() {
        let m = Match {
            id: "abc".to_string(),
            content: "text".to_string(),
            metadata: BTreeMap::new(),
            score: 0.75,
            collection: "p".to_string(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["match"], 0.75);
        assert_eq!(json["project_name"], "p");
    }
}
