//! Vector store abstraction for Joinery.
//!
//! Provides a trait-based interface for different vector database backends.
//! Every backend scores chunks as `1 - cosine_distance`, returns them by
//! descending score and breaks ties by chunk id.

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use postgres::{PgPool, PgVectorStore};
pub use sqlite::SqliteVectorStore;

use crate::error::{JoineryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A transcript chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    /// Title of the source video.
    pub title: String,
    /// URL of the source video.
    pub url: String,
    pub chunk_id: String,
    /// `1 - cosine_distance`, clamped to `[0, 1]`.
    pub similarity_score: f32,
}

/// A chunk as written by the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub title: String,
    pub url: String,
    pub chunk_id: String,
    /// Rows without a vector are stored but never returned by search.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl ChunkRecord {
    fn into_scored(self, query: &[f32]) -> Option<DocumentChunk> {
        let vector = self.vector?;
        Some(DocumentChunk {
            similarity_score: similarity_score(query, &vector),
            id: self.id,
            text: self.text,
            title: self.title,
            url: self.url,
            chunk_id: self.chunk_id,
        })
    }
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the `top_k` chunks of `collection` closest to `query_embedding`.
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>>;

    /// Number of chunks with a stored vector in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// `1 - cosine_distance`, clamped to `[0, 1]` (anti-correlated chunks score 0).
pub fn similarity_score(query: &[f32], vector: &[f32]) -> f32 {
    let score = cosine_similarity(query, vector);
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Sort by descending score, then ascending id, and keep the first `top_k`.
pub fn rank(mut chunks: Vec<DocumentChunk>, top_k: usize) -> Vec<DocumentChunk> {
    chunks.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    chunks.truncate(top_k);
    chunks
}

/// Validate a configured table name before it is spliced into SQL.
///
/// Collection names come from configuration, never from requests, but are
/// still restricted to `[A-Za-z_][A-Za-z0-9_]*` (optionally schema-qualified).
pub fn validate_collection(name: &str) -> Result<()> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(JoineryError::Config(format!(
            "Invalid collection name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Quote a validated (possibly schema-qualified) collection name.
pub fn quote_collection(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}


#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, score: f32) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            text: String::new(),
            title: String::new(),
            url: String::new(),
            chunk_id: String::new(),
            similarity_score: score,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_similarity_score_is_clamped() {
        assert_eq!(similarity_score(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((similarity_score(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 0.001);
        assert_eq!(similarity_score(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let ranked = rank(
            vec![chunk("b", 0.5), chunk("c", 0.9), chunk("a", 0.5), chunk("d", 0.1)],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection("bents").is_ok());
        assert!(validate_collection("public.bents_v2").is_ok());
        assert!(validate_collection("bents; DROP TABLE products").is_err());
        assert!(validate_collection("2bents").is_err());
        assert!(validate_collection("a.b.c").is_err());
        assert!(validate_collection("").is_err());
    }

    #[test]
    fn test_quote_collection() {
        assert_eq!(quote_collection("public.bents"), "\"public\".\"bents\"");
    }
}
