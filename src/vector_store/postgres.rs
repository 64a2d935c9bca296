//! Postgres + pgvector vector store.
//!
//! Similarity is computed by the database with the `<=>` cosine distance
//! operator; the query embedding and limit are always bound parameters.

use super::{quote_collection, rank, validate_collection, DocumentChunk, VectorStore};
use crate::error::{JoineryError, Result};
use async_trait::async_trait;
use pgvector::Vector;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error, info, instrument};

/// A fixed number of lazily opened Postgres connections shared round-robin.
///
/// Each query runs in autocommit mode. Closed connections, and connections
/// unused for longer than the idle timeout, are reopened on next use.
pub struct PgPool {
    config: Config,
    slots: Vec<Mutex<Option<Slot>>>,
    next: AtomicUsize,
    idle_timeout: Duration,
}

struct Slot {
    client: Arc<Client>,
    last_used: Instant,
}

/// True once a connection has sat unused for at least `idle_timeout`.
fn is_idle(last_used: Instant, now: Instant, idle_timeout: Duration) -> bool {
    now.saturating_duration_since(last_used) >= idle_timeout
}

impl PgPool {
    /// Build a pool of at most `max_connections` connections to `url`.
    pub fn new(
        url: &str,
        max_connections: usize,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let mut config: Config = url.parse()?;
        config.connect_timeout(connect_timeout);

        let slots = (0..max_connections.max(1)).map(|_| Mutex::new(None)).collect();

        Ok(Self {
            config,
            slots,
            next: AtomicUsize::new(0),
            idle_timeout,
        })
    }

    /// Maximum number of connections.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Get a live connection, opening one if the slot is empty, closed or idle.
    pub async fn client(&self) -> Result<Arc<Client>> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut slot = self.slots[index].lock().await;
        let now = Instant::now();

        if let Some(open) = slot.as_mut() {
            if !open.client.is_closed() && !is_idle(open.last_used, now, self.idle_timeout) {
                open.last_used = now;
                return Ok(open.client.clone());
            }
        }

        let (client, connection) = self.config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection error: {}", e);
            }
        });
        info!("Opened Postgres connection {}/{}", index + 1, self.slots.len());

        let client = Arc::new(client);
        *slot = Some(Slot {
            client: client.clone(),
            last_used: Instant::now(),
        });
        Ok(client)
    }

    /// Drop connections idle past the timeout. Returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for slot in &self.slots {
            let mut slot = slot.lock().await;
            let stale = slot.as_ref().is_some_and(|open| {
                open.client.is_closed() || is_idle(open.last_used, now, self.idle_timeout)
            });
            if stale {
                *slot = None;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Closed {} idle Postgres connections", evicted);
        }
        evicted
    }

    /// Periodically evict idle connections until the pool is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_reaper(pool: &Arc<Self>) {
        let weak = Arc::downgrade(pool);
        let period = pool.idle_timeout.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else {
                    break;
                };
                pool.evict_idle().await;
            }
        });
    }
}

/// pgvector-backed vector store.
pub struct PgVectorStore {
    pool: Arc<PgPool>,
}

impl PgVectorStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn search_sql(collection: &str) -> String {
    let table = quote_collection(collection);
    format!(
        "SELECT id::text, text, title, url, chunk_id::text, \
                (1 - (vector <=> $1))::float8 AS similarity_score \
         FROM {table} \
         WHERE vector IS NOT NULL \
         ORDER BY vector <=> $1, id \
         LIMIT $2"
    )
}

fn count_sql(collection: &str) -> String {
    let table = quote_collection(collection);
    format!("SELECT COUNT(*) FROM {table} WHERE vector IS NOT NULL")
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[instrument(skip(self, query_embedding))]
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>> {
        validate_collection(collection)?;
        let client = self.pool.client().await?;

        let embedding = Vector::from(query_embedding.to_vec());
        let limit = i64::try_from(top_k)
            .map_err(|_| JoineryError::InvalidInput(format!("top_k too large: {}", top_k)))?;

        let rows = client
            .query(search_sql(collection).as_str(), &[&embedding, &limit])
            .await?;

        let chunks = rows
            .into_iter()
            .map(|row| {
                let score: Option<f64> = row.get(5);
                let score = score.unwrap_or(0.0) as f32;
                DocumentChunk {
                    id: row.get(0),
                    text: row.get(1),
                    title: row.get(2),
                    url: row.get(3),
                    chunk_id: row.get(4),
                    similarity_score: if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) },
                }
            })
            .collect();

        let results = rank(chunks, top_k);
        debug!("Found {} matching chunks in {}", results.len(), collection);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        validate_collection(collection)?;
        let client = self.pool.client().await?;
        let row = client.query_one(count_sql(collection).as_str(), &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }
}
