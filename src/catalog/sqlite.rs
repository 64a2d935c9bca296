//! SQLite product catalog.

use super::{like_pattern, tag_match_clause, Product, ProductCatalog};
use crate::error::{JoineryError, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        tags TEXT,
        link TEXT NOT NULL
    );
"#;

/// Product catalog stored in a SQLite `products` table.
pub struct SqliteProductCatalog {
    conn: Mutex<Connection>,
}

impl SqliteProductCatalog {
    /// Open the catalog in the SQLite database at `path`.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory catalog (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| JoineryError::Catalog(format!("Failed to acquire lock: {}", e)))
    }

    /// Insert or replace a product; tags are stored comma-separated.
    pub fn upsert(&self, product: &Product) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO products (id, title, tags, link) VALUES (?1, ?2, ?3, ?4)",
            params![product.id, product.title, product.tags.join(","), product.link],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for SqliteProductCatalog {
    #[instrument(skip(self), fields(titles = titles.len()))]
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Product>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, title, tags, link FROM products WHERE {} ORDER BY id",
            tag_match_clause(titles.len(), |i| format!("?{}", i))
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(titles.iter().map(|t| like_pattern(t))), |row| {
            Ok(Product::from_row(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

        let products = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Matched {} products", products.len());
        Ok(products)
    }
}
