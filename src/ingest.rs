//! Collection ingest with content-addressed dedup.

use crate::embedding::Embedder;
use crate::extract;
use crate::models::{CollectionKind, ContentUnit};
use crate::normalize;
use crate::store::VectorStore;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// What an ingest pass did to a collection.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    /// Units newly added this pass.
    pub added: usize,
    /// Units in the collection after the pass.
    pub total: usize,
}

/// Add units to a collection, creating it if needed and dropping any unit
/// whose content id is already present (in the collection or earlier in the
/// same batch). Embeds only the survivors, in one call.
pub async fn ingest(
    store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    collection: &str,
    kind: CollectionKind,
    units: Vec<ContentUnit>,
) -> Result<IngestOutcome> {
    if store.collection_info(collection).await?.is_none() {
        store.create_collection(collection, kind).await?;
    }

    let mut seen: HashSet<String> = store.list_ids(collection).await?.into_iter().collect();
    let fresh: Vec<ContentUnit> = units
        .into_iter()
        .filter(|u| seen.insert(u.id.clone()))
        .collect();

    if fresh.is_empty() {
        let total = store.list_ids(collection).await?.len();
        return Ok(IngestOutcome { added: 0, total });
    }

    let texts: Vec<String> = fresh.iter().map(|u| u.text.clone()).collect();
    let embeddings = embedder.encode(&texts).await?;

    let added = fresh.len();
    store.upsert(collection, fresh, embeddings).await?;
    let total = store.list_ids(collection).await?.len();

    tracing::info!(collection, added, total, "Ingest complete");
    Ok(IngestOutcome { added, total })
}

/// Parse and ingest CSV bytes into a tabular collection.
pub async fn ingest_csv(
    store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    collection: &str,
    bytes: &[u8],
) -> Result<IngestOutcome> {
    let units = normalize::units_from_csv(bytes)?;
    ingest(store, embedder, collection, CollectionKind::Tabular, units).await
}

/// Extract fragments from PDF bytes and ingest them. A document that yields
/// no fragments still creates the collection and succeeds with zero added.
pub async fn ingest_document(
    store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    collection: &str,
    bytes: Vec<u8>,
) -> Result<IngestOutcome> {
    // pdf parsing is CPU-bound, keep it off the runtime threads
    let pages = tokio::task::spawn_blocking(move || extract::pdf_pages(&bytes)).await??;
    let fragments = extract::extract_fragments(&pages);
    let units = normalize::units_from_fragments(fragments);
    ingest(
        store,
        embedder,
        collection,
        CollectionKind::DocumentProblems,
        units,
    )
    .await
}
