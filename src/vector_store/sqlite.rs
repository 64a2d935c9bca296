//! SQLite-based vector store implementation.
//!
//! Vectors are stored as little-endian `f32` blobs and scored in Rust.
//! Each collection is its own table.

use super::{quote_collection, rank, validate_collection, ChunkRecord, DocumentChunk, VectorStore};
use crate::error::{JoineryError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a SQLite vector store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!("Opened SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| JoineryError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Create the table for `collection` if it does not exist.
    pub fn ensure_collection(&self, collection: &str) -> Result<()> {
        validate_collection(collection)?;
        let table = quote_collection(collection);
        let conn = self.lock()?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                vector BLOB
            );
            "#
        ))?;
        Ok(())
    }

    /// Insert or replace chunks in `collection`, creating it if needed.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub fn upsert_chunks(&self, collection: &str, chunks: &[ChunkRecord]) -> Result<usize> {
        self.ensure_collection(collection)?;
        let table = quote_collection(collection);
        let conn = self.lock()?;

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} (id, text, title, url, chunk_id, vector) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.text,
                    chunk.title,
                    chunk.url,
                    chunk.chunk_id,
                    chunk.vector.as_deref().map(embedding_to_bytes),
                ])?;
            }
        }
        tx.commit()?;

        info!("Upserted {} chunks into {}", chunks.len(), collection);
        Ok(chunks.len())
    }
}

/// Serialize embedding to bytes.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
            f32::from_le_bytes(arr)
        })
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, query_embedding))]
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>> {
        validate_collection(collection)?;
        let table = quote_collection(collection);
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id, text, title, url, chunk_id, vector FROM {table} WHERE vector IS NOT NULL"
        ))?;

        let rows = stmt.query_map([], |row| {
            let bytes: Vec<u8> = row.get(5)?;
            Ok(ChunkRecord {
                id: row.get(0)?,
                text: row.get(1)?,
                title: row.get(2)?,
                url: row.get(3)?,
                chunk_id: row.get(4)?,
                vector: Some(bytes_to_embedding(&bytes)),
            })
        })?;

        let mut scored = Vec::new();
        for row in rows {
            if let Some(chunk) = row?.into_scored(query_embedding) {
                scored.push(chunk);
            }
        }

        let results = rank(scored, top_k);
        debug!("Found {} matching chunks in {}", results.len(), collection);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        validate_collection(collection)?;
        let table = quote_collection(collection);
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE vector IS NOT NULL"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
