//! Postgres product catalog.

use super::{like_pattern, tag_match_clause, Product, ProductCatalog};
use crate::error::Result;
use crate::vector_store::PgPool;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tracing::{debug, instrument};

/// Product catalog stored in the Postgres `products` table.
pub struct PgProductCatalog {
    pool: Arc<PgPool>,
}

impl PgProductCatalog {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn find_sql(count: usize) -> String {
    format!(
        "SELECT DISTINCT ON (id) id::text, title, tags, link FROM products WHERE {} ORDER BY id",
        tag_match_clause(count, |i| format!("${}", i))
    )
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    #[instrument(skip(self), fields(titles = titles.len()))]
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Product>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.pool.client().await?;
        let patterns: Vec<String> = titles.iter().map(|t| like_pattern(t)).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            patterns.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = client.query(find_sql(titles.len()).as_str(), &params).await?;

        let products: Vec<Product> = rows
            .into_iter()
            .map(|row| Product::from_row(row.get(0), row.get(1), row.get(2), row.get(3)))
            .collect();

        debug!("Matched {} products", products.len());
        Ok(products)
    }
}
