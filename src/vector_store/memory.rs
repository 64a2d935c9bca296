//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{rank, ChunkRecord, DocumentChunk, VectorStore};
use crate::error::{JoineryError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory vector store keyed by collection name.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append chunks to a collection.
    pub fn insert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| JoineryError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(chunks);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| JoineryError::VectorStore(format!("Failed to acquire lock: {}", e)))?;

        let chunks = collections
            .get(collection)
            .ok_or_else(|| JoineryError::VectorStore(format!("Unknown collection: {}", collection)))?;

        let scored = chunks
            .iter()
            .cloned()
            .filter_map(|record| record.into_scored(query_embedding))
            .collect();

        Ok(rank(scored, top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| JoineryError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        Ok(collections
            .get(collection)
            .map(|chunks| chunks.iter().filter(|c| c.vector.is_some()).count())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[tokio::test]
    async fn test_memory_vector_store() {
        let store = MemoryVectorStore::new();
        let mut chunks = fixtures::fan(12);
        chunks[3].vector = None;
        store.insert("bents", chunks).unwrap();

        assert_eq!(store.count("bents").await.unwrap(), 11);

        let results = store.search(&[1.0, 0.0, 0.0], "bents", 10).await.unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].id, "doc-00");
        assert!(results.iter().all(|r| r.id != "doc-03"));
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
        assert!(results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.similarity_score)));
    }

    #[tokio::test]
    async fn test_unknown_collection_is_an_error() {
        let store = MemoryVectorStore::new();
        assert!(store.search(&[1.0], "missing", 10).await.is_err());
    }
}
