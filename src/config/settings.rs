//! Configuration settings for Joinery.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub openai: OpenAISettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// Alternative API base (OpenAI-compatible endpoints).
    pub api_base: Option<String>,
    /// HTTP timeout for a single provider request.
    pub request_timeout_secs: u64,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            api_base: None,
            request_timeout_secs: 120,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use. Stored vectors are only valid for this model.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Wait bound for a single embedding attempt.
    pub timeout_secs: u64,
    /// Extra attempts after the first one fails.
    pub max_retries: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            dimensions: 1536,
            timeout_secs: 5,
            max_retries: 2,
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// Local SQLite database, similarity computed in-process.
    #[default]
    Sqlite,
    /// Postgres with the pgvector extension.
    Postgres,
}

impl std::str::FromStr for StoreProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StoreProvider::Sqlite),
            "postgres" | "pgvector" | "neon" => Ok(StoreProvider::Postgres),
            _ => Err(format!("Unknown vector store provider: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreProvider::Sqlite => write!(f, "sqlite"),
            StoreProvider::Postgres => write!(f, "postgres"),
        }
    }
}

/// Vector store and product catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Backend (sqlite, postgres).
    pub provider: StoreProvider,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
    /// Postgres connection string. Falls back to `POSTGRES_URL`.
    pub postgres_url: Option<String>,
    /// Table holding document chunks. Trusted configuration, never user input.
    pub collection: String,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Upper bound on open Postgres connections.
    pub max_connections: usize,
    /// Connection establishment timeout.
    pub connect_timeout_secs: u64,
    /// Pooled connections unused this long are closed.
    pub idle_timeout_secs: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Sqlite,
            sqlite_path: "~/.joinery/vectors.db".to_string(),
            postgres_url: None,
            collection: "bents".to_string(),
            top_k: 10,
            max_connections: 20,
            connect_timeout_secs: 10,
            idle_timeout_secs: 30,
        }
    }
}

impl VectorStoreSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Retrieval pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Model for relevance classification.
    pub classifier_model: String,
    /// Model for query rewriting.
    pub rewrite_model: String,
    /// Model for streamed answers and canned replies.
    pub answer_model: String,
    /// Model for citation extraction.
    pub extraction_model: String,
    /// Number of trailing chat turns shown to the classifier and generator.
    pub history_window: usize,
    /// Wait bound for the relevance call.
    pub classify_timeout_secs: u64,
    /// Wait bound for the rewrite call.
    pub rewrite_timeout_secs: u64,
    /// Wait bound for the extraction call.
    pub extraction_timeout_secs: u64,
    /// Sampling temperature for answers (provider default when unset).
    pub answer_temperature: Option<f32>,
    /// Emit citations in-band once the answer stream completes.
    pub auto_citations: bool,
    /// How long a pending extraction context survives without a follow-up.
    pub pending_ttl_secs: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            classifier_model: "gpt-4o-2024-11-20".to_string(),
            rewrite_model: "gpt-4o-2024-11-20".to_string(),
            answer_model: "gpt-4o-2024-11-20".to_string(),
            extraction_model: "gpt-4o-2024-11-20".to_string(),
            history_window: 5,
            classify_timeout_secs: 15,
            rewrite_timeout_secs: 15,
            extraction_timeout_secs: 30,
            answer_temperature: None,
            auto_citations: false,
            pending_ttl_secs: 600,
        }
    }
}

impl RagSettings {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn rewrite_timeout(&self) -> Duration {
        Duration::from_secs(self.rewrite_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::JoineryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("joinery")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Postgres connection string from config or the `POSTGRES_URL` environment variable.
    pub fn postgres_url(&self) -> Option<String> {
        self.vector_store
            .postgres_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| std::env::var("POSTGRES_URL").ok().filter(|u| !u.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let settings = Settings::default();
        assert_eq!(settings.embedding.dimensions, 1536);
        assert_eq!(settings.embedding.timeout_secs, 5);
        assert_eq!(settings.embedding.max_retries, 2);
        assert_eq!(settings.vector_store.top_k, 10);
        assert_eq!(settings.vector_store.collection, "bents");
        assert_eq!(settings.vector_store.idle_timeout(), Duration::from_secs(30));
        assert_eq!(settings.rag.history_window, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[vector_store]\nprovider = \"postgres\"\ncollection = \"shop_talk\"\n\n[rag]\nauto_citations = true\n",
        )
        .unwrap();

        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.vector_store.provider, StoreProvider::Postgres);
        assert_eq!(settings.vector_store.collection, "shop_talk");
        assert_eq!(settings.vector_store.top_k, 10);
        assert!(settings.rag.auto_citations);
        assert_eq!(settings.embedding.model, "text-embedding-ada-002");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.server.port = 8088;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 8088);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("pgvector".parse::<StoreProvider>().unwrap(), StoreProvider::Postgres);
        assert_eq!("SQLite".parse::<StoreProvider>().unwrap(), StoreProvider::Sqlite);
        assert!("qdrant".parse::<StoreProvider>().is_err());
    }
}
