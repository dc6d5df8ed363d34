//! In-memory vector collections with brute-force similarity search.

use crate::embedding::cosine_similarity;
use crate::models::{CollectionInfo, CollectionKind, ContentUnit, ScoredUnit};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage backend for named collections of embedded content units.
///
/// Collections preserve insertion order and reject duplicate unit ids, so
/// content-addressed dedup can be done by the caller with `list_ids`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, kind: CollectionKind) -> Result<()>;

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Unit ids in insertion order.
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>>;

    /// Insert units with their embeddings. Fails on a duplicate id or when
    /// the two slices disagree in length.
    async fn upsert(
        &self,
        collection: &str,
        units: Vec<ContentUnit>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()>;

    /// Top `top_k` units by cosine similarity to `query`, descending. Ties
    /// keep insertion order.
    async fn query(&self, collection: &str, query: &[f32], top_k: usize)
        -> Result<Vec<ScoredUnit>>;

    async fn delete_collection(&self, name: &str) -> Result<bool>;
}

struct MemoryCollection {
    info: CollectionInfo,
    /// Units and their embeddings, parallel vectors in insertion order.
    units: Vec<ContentUnit>,
    embeddings: Vec<Vec<f32>>,
}

/// Process-local [`VectorStore`]. Everything lives behind one `RwLock`, which
/// is plenty for a single worker plus the request handlers.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<dyn VectorStore> {
        Arc::new(Self::new())
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(&self, name: &str, kind: CollectionKind) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            bail!("Collection '{}' already exists", name);
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                info: CollectionInfo::new(name, kind),
                units: Vec::new(),
                embeddings: Vec::new(),
            },
        );
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.info.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections.values().map(|c| c.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| anyhow::anyhow!("Collection '{}' not found", collection))?;
        Ok(coll.units.iter().map(|u| u.id.clone()).collect())
    }

    async fn upsert(
        &self,
        collection: &str,
        units: Vec<ContentUnit>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if units.len() != embeddings.len() {
            bail!(
                "Unit/embedding count mismatch: {} units, {} embeddings",
                units.len(),
                embeddings.len()
            );
        }

        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("Collection '{}' not found", collection))?;

        for unit in &units {
            if coll.units.iter().any(|u| u.id == unit.id) {
                bail!(
                    "Unit '{}' already exists in collection '{}'",
                    unit.id,
                    collection
                );
            }
        }

        coll.units.extend(units);
        coll.embeddings.extend(embeddings);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredUnit>> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| anyhow::anyhow!("Collection '{}' not found", collection))?;

        let mut scored: Vec<ScoredUnit> = coll
            .units
            .iter()
            .zip(coll.embeddings.iter())
            .map(|(unit, embedding)| ScoredUnit {
                unit: unit.clone(),
                score: cosine_similarity(query, embedding) as f64,
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn unit(text: &str) -> ContentUnit {
        ContentUnit::new(text.to_string(), BTreeMap::new())
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("people", CollectionKind::Tabular)
            .await
            .unwrap();
        store
            .create_collection("docs", CollectionKind::DocumentProblems)
            .await
            .unwrap();

        let infos = store.list_collections().await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "docs");
        assert_eq!(infos[1].name, "people");
        assert_eq!(infos[0].metric, "cosine");
    }

    #[tokio::test]
    async fn test_duplicate_collection_rejected() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("people", CollectionKind::Tabular)
            .await
            .unwrap();
        assert!(store
            .create_collection("people", CollectionKind::Tabular)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_upsert_rejects_duplicate_id() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c", CollectionKind::Tabular)
            .await
            .unwrap();
        store
            .upsert("c", vec![unit("hello")], vec![vec![1.0, 0.0]])
            .await
            .unwrap();
        let err = store
            .upsert("c", vec![unit("hello")], vec![vec![0.0, 1.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c", CollectionKind::Tabular)
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![unit("far"), unit("near"), unit("mid")],
                vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
            )
            .await
            .unwrap();

        let results = store.query("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].unit.text, "near");
        assert_eq!(results[1].unit.text, "mid");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_query_ties_keep_insertion_order() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c", CollectionKind::Tabular)
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![unit("first"), unit("second")],
                vec![vec![1.0, 0.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let results = store.query("c", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results[0].unit.text, "first");
        assert_eq!(results[1].unit.text, "second");
    }

    #[tokio::test]
    async fn test_query_unknown_collection() {
        let store = MemoryVectorStore::new();
        assert!(store.query("nope", &[1.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c", CollectionKind::Tabular)
            .await
            .unwrap();
        let results = store.query("c", &[1.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_delete_collection() {
        let store = MemoryVectorStore::new();
        store
            .create_collection("c", CollectionKind::Tabular)
            .await
            .unwrap();
        assert!(store.delete_collection("c").await.unwrap());
        assert!(!store.delete_collection("c").await.unwrap());
        assert!(store.collection_info("c").await.unwrap().is_none());
    }
}
