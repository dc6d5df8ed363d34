//! Two-stage comparison of a query against a collection.
//!
//! Stage one ranks by cosine similarity and keeps the top candidates. Stage
//! two, when a rescorer is configured, asks a language model to rate each
//! survivor and blends the two scores. A failed or partial rescoring batch
//! degrades to the similarity score rather than failing the comparison.

use crate::embedding::Embedder;
use crate::models::Match;
use crate::rescore::Rescorer;
use crate::store::VectorStore;
use std::fmt;
use std::sync::Arc;

/// Weight of the cosine similarity score in the blended result.
pub const PRIMARY_WEIGHT: f64 = 0.4;
/// Weight of the model rating in the blended result.
pub const RESCORE_WEIGHT: f64 = 0.6;
/// Candidates kept past the first stage.
pub const TOP_K: usize = 5;

#[derive(Debug)]
pub enum CompareError {
    CollectionNotFound(String),
    Scoring(anyhow::Error),
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareError::CollectionNotFound(name) => {
                write!(f, "Collection '{}' not found", name)
            }
            CompareError::Scoring(e) => write!(f, "Scoring failed: {}", e),
        }
    }
}

impl std::error::Error for CompareError {}

impl From<anyhow::Error> for CompareError {
    fn from(e: anyhow::Error) -> Self {
        CompareError::Scoring(e)
    }
}

/// Rank `query` against a collection and return the blended top matches,
/// best first.
pub async fn compare(
    store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    rescorer: Option<&Rescorer>,
    collection: &str,
    query: &str,
) -> Result<Vec<Match>, CompareError> {
    if store.collection_info(collection).await?.is_none() {
        return Err(CompareError::CollectionNotFound(collection.to_string()));
    }

    let query_vecs = embedder.encode(&[query.to_string()]).await?;
    let query_vec = query_vecs
        .first()
        .ok_or_else(|| CompareError::Scoring(anyhow::anyhow!("Empty embedding for query")))?;

    let candidates = store.query(collection, query_vec, TOP_K).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();

    if let Some(rescorer) = rescorer {
        let texts: Vec<String> = candidates.iter().map(|c| c.unit.text.clone()).collect();
        match rescorer.rescore(query, &texts).await {
            Ok(rescored) => {
                for (score, slot) in scores.iter_mut().zip(rescored) {
                    if let Some(rating) = slot {
                        *score = PRIMARY_WEIGHT * *score + RESCORE_WEIGHT * rating;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rescoring failed, keeping similarity scores");
            }
        }
    }

    let mut matches: Vec<Match> = candidates
        .into_iter()
        .zip(scores)
        .map(|(scored, score)| Match {
            id: scored.unit.id,
            content: scored.unit.text,
            metadata: scored.unit.metadata,
            score,
            collection: collection.to_string(),
        })
        .collect();

    // Blending can reorder the stage-one ranking; stable sort keeps the
    // stage-one order among equals.
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(matches)
}
