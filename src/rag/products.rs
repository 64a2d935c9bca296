//! Product correlation for cited videos.

use crate::catalog::{Product, ProductCatalog};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up catalog products tagged with cited video titles.
pub struct ProductCorrelator {
    catalog: Arc<dyn ProductCatalog>,
}

impl ProductCorrelator {
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { catalog }
    }

    /// Products related to any of `titles`, each id at most once.
    ///
    /// Catalog failures are logged and yield no products.
    pub async fn correlate(&self, titles: &[String]) -> Vec<Product> {
        let mut seen_titles = HashSet::new();
        let titles: Vec<String> = titles
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen_titles.insert(t.to_lowercase()))
            .map(str::to_string)
            .collect();

        if titles.is_empty() {
            return Vec::new();
        }

        let products = match self.catalog.find_by_titles(&titles).await {
            Ok(products) => products,
            Err(e) => {
                warn!("Product lookup failed: {}", e);
                return Vec::new();
            }
        };

        let mut seen_ids = HashSet::new();
        let products: Vec<Product> = products
            .into_iter()
            .filter(|p| seen_ids.insert(p.id.clone()))
            .collect();

        debug!("Correlated {} products for {} titles", products.len(), titles.len());
        products
    }
}
