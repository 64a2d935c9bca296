//! In-memory product catalog.

use super::{Product, ProductCatalog};
use crate::error::Result;
use async_trait::async_trait;

/// Catalog backed by a fixed list of products.
#[derive(Default)]
pub struct MemoryCatalog {
    products: Vec<Product>,
}

impl MemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Product>> {
        let needles: Vec<String> = titles.iter().map(|t| t.to_lowercase()).collect();

        Ok(self
            .products
            .iter()
            .filter(|p| {
                let haystack = p.tags.join(", ").to_lowercase();
                needles.iter().any(|n| haystack.contains(n.as_str()))
            })
            .cloned()
            .collect())
    }
}
