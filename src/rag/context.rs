//! Context building for RAG responses.

use crate::embedding::Embedder;
use crate::error::{JoineryError, Result};
use crate::vector_store::{DocumentChunk, VectorStore};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Embeds a search query and retrieves the closest transcript chunks.
pub struct ContextBuilder {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl ContextBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        collection: &str,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            collection: collection.to_string(),
            top_k,
        }
    }

    /// Embed the search query.
    pub async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(JoineryError::InvalidInput(
                "Cannot embed an empty query".to_string(),
            ));
        }
        self.embedder.embed(query).await
    }

    /// Retrieve the top chunks for an embedding, best first.
    #[instrument(skip(self, embedding), fields(collection = %self.collection))]
    pub async fn retrieve(&self, embedding: &[f32]) -> Result<Vec<DocumentChunk>> {
        let chunks = self
            .vector_store
            .search(embedding, &self.collection, self.top_k)
            .await?;
        debug!("Retrieved {} chunks", chunks.len());
        Ok(chunks)
    }
}

/// Format retrieved chunks as the context block for the answer prompt.
pub fn format_context_for_prompt(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "Source: {}\nContent: {}\nURL: {}",
                chunk.title, chunk.text, chunk.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
