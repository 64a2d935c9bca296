//! Product catalog lookups.
//!
//! Products are matched when a video title occurs, case-insensitively, inside
//! the product's comma-separated tag string.

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryCatalog;
pub use postgres::PgProductCatalog;
pub use sqlite::SqliteProductCatalog;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub link: String,
}

impl Product {
    /// Build a product from the stored comma-separated tag string.
    pub fn from_row(id: String, title: String, tags: Option<String>, link: String) -> Self {
        Self {
            id,
            title,
            tags: split_tags(tags.as_deref().unwrap_or_default()),
            link,
        }
    }
}

/// Split a stored tag string into trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Escape `%`, `_` and `\` so a title is matched literally inside `LIKE`.
pub fn like_pattern(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len() + 2);
    escaped.push('%');
    for c in title.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Build `LOWER(tags) LIKE LOWER(<p1>) ESCAPE '\' OR ...` for `count` bound titles.
pub(crate) fn tag_match_clause(count: usize, placeholder: impl Fn(usize) -> String) -> String {
    (1..=count)
        .map(|i| format!("LOWER(tags) LIKE LOWER({}) ESCAPE '\\'", placeholder(i)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Trait for product catalog backends.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Products whose tag string contains any of `titles`.
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Product>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        assert_eq!(
            split_tags("workshop tour, hand tools,, "),
            vec!["workshop tour".to_string(), "hand tools".to_string()]
        );
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Workshop Tour"), "%Workshop Tour%");
        assert_eq!(like_pattern("100% Oak_Build"), "%100\\% Oak\\_Build%");
    }

    #[test]
    fn test_tag_match_clause() {
        let clause = tag_match_clause(2, |i| format!("${}", i));
        assert_eq!(
            clause,
            "LOWER(tags) LIKE LOWER($1) ESCAPE '\\' OR LOWER(tags) LIKE LOWER($2) ESCAPE '\\'"
        );
    }
}
