//! Error types for Joinery.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Library-level error type for Joinery operations.
#[derive(Error, Debug)]
pub enum JoineryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Product catalog error: {0}")]
    Catalog(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("{stage} timed out after {seconds:.1}s")]
    Timeout { stage: &'static str, seconds: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl JoineryError {
    /// Stable, machine-readable name for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            JoineryError::Config(_) => "config",
            JoineryError::Embedding(_) => "embedding",
            JoineryError::VectorStore(_) | JoineryError::Database(_) | JoineryError::Postgres(_) => {
                "vector_store"
            }
            JoineryError::Catalog(_) => "catalog",
            JoineryError::Rag(_) => "rag",
            JoineryError::OpenAI(_) | JoineryError::Http(_) => "provider",
            JoineryError::Timeout { .. } => "timeout",
            JoineryError::InvalidInput(_) => "invalid_input",
            JoineryError::Io(_) => "io",
            JoineryError::Json(_) | JoineryError::TomlParse(_) => "serialization",
        }
    }

    /// Convert into the structured object sent to callers.
    pub fn to_payload(&self, stage: Option<&str>) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
            stage: stage.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Error object serialized at the request boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result type alias for Joinery operations.
pub type Result<T> = std::result::Result<T, JoineryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload() {
        let err = JoineryError::Timeout {
            stage: "embedding",
            seconds: 5.0,
        };
        let payload = err.to_payload(Some("embedding"));

        assert_eq!(payload.kind, "timeout");
        assert_eq!(payload.message, "embedding timed out after 5.0s");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["stage"], "embedding");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_payload_omits_missing_stage() {
        let payload = JoineryError::Rag("empty response".to_string()).to_payload(None);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("stage").is_none());
        assert_eq!(json["kind"], "rag");
    }
}
