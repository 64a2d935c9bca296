//! OpenAI embeddings implementation.

use super::Embedder;
use crate::config::EmbeddingSettings;
use crate::error::{JoineryError, Result};
use crate::openai::with_retries;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequest, CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// OpenAI has a limit on inputs per request.
const BATCH_SIZE: usize = 100;

/// OpenAI-based embedder with a bounded wait and retries per request.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
    timeout: Duration,
    max_retries: usize,
}

impl OpenAIEmbedder {
    /// Create an embedder from settings.
    pub fn new(client: Client<OpenAIConfig>, settings: &EmbeddingSettings) -> Self {
        Self {
            client,
            model: settings.model.clone(),
            dimensions: settings.dimensions as usize,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
        }
    }

    fn build_request(&self, input: Vec<String>) -> Result<CreateEmbeddingRequest> {
        let mut args = CreateEmbeddingRequestArgs::default();
        args.model(&self.model).input(EmbeddingInput::StringArray(input));

        // Only the v3 models accept a dimensions override.
        if supports_dimensions(&self.model) {
            args.dimensions(self.dimensions as u32);
        }

        args.build()
            .map_err(|e| JoineryError::Embedding(format!("Failed to build request: {}", e)))
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(JoineryError::Embedding(format!(
                "Model {} returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn supports_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(JoineryError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| JoineryError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let request = self.build_request(chunk.to_vec())?;

            let response = with_retries("embedding", self.timeout, self.max_retries, || {
                let request = request.clone();
                async move {
                    self.client
                        .embeddings()
                        .create(request)
                        .await
                        .map_err(|e| JoineryError::OpenAI(format!("Embedding API error: {}", e)))
                }
            })
            .await?;

            // Sort by index to ensure correct order
            let mut embeddings: Vec<_> = response.data.into_iter().collect();
            embeddings.sort_by_key(|e| e.index);

            if embeddings.len() != chunk.len() {
                return Err(JoineryError::Embedding(format!(
                    "Received {} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                )));
            }

            for embedding_data in embeddings {
                self.check_dimensions(&embedding_data.embedding)?;
                all_embeddings.push(embedding_data.embedding);
            }
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(model: &str, dimensions: u32) -> OpenAIEmbedder {
        let settings = EmbeddingSettings {
            model: model.to_string(),
            dimensions,
            ..EmbeddingSettings::default()
        };
        OpenAIEmbedder::new(Client::new(), &settings)
    }

    #[test]
    fn test_embedder_creation() {
        let embedder = embedder("text-embedding-ada-002", 1536);
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.timeout, Duration::from_secs(5));
        assert_eq!(embedder.max_retries, 2);

        let embedder = self::embedder("text-embedding-3-large", 3072);
        assert_eq!(embedder.dimensions(), 3072);
    }

    #[test]
    fn test_dimensions_only_sent_to_v3_models() {
        let request = embedder("text-embedding-ada-002", 1536)
            .build_request(vec!["dovetail".to_string()])
            .unwrap();
        assert!(request.dimensions.is_none());

        let request = embedder("text-embedding-3-small", 1536)
            .build_request(vec!["dovetail".to_string()])
            .unwrap();
        assert_eq!(request.dimensions, Some(1536));
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let embedder = embedder("text-embedding-ada-002", 4);
        assert!(embedder.check_dimensions(&[0.0; 4]).is_ok());
        assert!(matches!(
            embedder.check_dimensions(&[0.0; 3]),
            Err(JoineryError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let result = embedder("text-embedding-ada-002", 1536).embed("   ").await;
        assert!(matches!(result, Err(JoineryError::InvalidInput(_))));
    }
}
