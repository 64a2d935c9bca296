//! Index command: load transcript chunks or products from JSONL.

use crate::catalog::{split_tags, Product, SqliteProductCatalog};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{JoineryError, Result as JoineryResult};
use crate::openai::create_client_with;
use crate::vector_store::{ChunkRecord, SqliteVectorStore};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const EMBED_BATCH: usize = 100;

/// A transcript chunk line: `{id, text, title, url, chunk_id}`.
#[derive(Debug, Deserialize)]
struct ChunkLine {
    id: String,
    text: String,
    title: String,
    url: String,
    #[serde(default)]
    chunk_id: serde_json::Value,
}

impl ChunkLine {
    fn into_record(self) -> ChunkRecord {
        let chunk_id = match self.chunk_id {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        ChunkRecord {
            id: self.id,
            text: self.text,
            title: self.title,
            url: self.url,
            chunk_id,
            vector: None,
        }
    }
}

/// Tags may be a list or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Tags {
    List(Vec<String>),
    Text(String),
}

/// A product line: `{id, title, tags, link}`.
#[derive(Debug, Deserialize)]
struct ProductLine {
    id: String,
    title: String,
    #[serde(default)]
    tags: Option<Tags>,
    link: String,
}

impl ProductLine {
    fn into_product(self) -> Product {
        let tags = match self.tags {
            Some(Tags::List(tags)) => tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            Some(Tags::Text(text)) => split_tags(&text),
            None => Vec::new(),
        };
        Product {
            id: self.id,
            title: self.title,
            tags,
            link: self.link,
        }
    }
}

/// Parse non-blank JSONL lines, reporting the 1-based line of the first bad record.
fn parse_lines<T: DeserializeOwned>(content: &str) -> JoineryResult<Vec<T>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| JoineryError::InvalidInput(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Run the index command.
pub async fn run_index(
    file: &Path,
    collection: Option<&str>,
    products: bool,
    settings: Settings,
) -> Result<()> {
    let operation = if products {
        Operation::ImportProducts
    } else {
        Operation::Index
    };
    if let Err(e) = preflight::check(operation, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let content = std::fs::read_to_string(file)?;

    if products {
        let lines: Vec<ProductLine> = parse_lines(&content)?;
        let catalog = SqliteProductCatalog::new(&settings.sqlite_path())?;
        let count = lines.len();
        for line in lines {
            catalog.upsert(&line.into_product())?;
        }
        Output::success(&format!("Imported {} products", count));
        return Ok(());
    }

    let collection = collection.unwrap_or(&settings.vector_store.collection);
    let mut records: Vec<ChunkRecord> = parse_lines::<ChunkLine>(&content)?
        .into_iter()
        .map(ChunkLine::into_record)
        .collect();
    if records.is_empty() {
        Output::warning("No records found.");
        return Ok(());
    }

    let client = create_client_with(
        settings.openai.api_base.as_deref(),
        Duration::from_secs(settings.openai.request_timeout_secs),
    )?;
    let embedder = OpenAIEmbedder::new(client, &settings.embedding);
    let store = SqliteVectorStore::new(&settings.sqlite_path())?;

    let pb = Output::progress_bar(records.len() as u64, "Embedding chunks");
    let mut stored = 0;
    for batch in records.chunks_mut(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (record, vector) in batch.iter_mut().zip(vectors) {
            record.vector = Some(vector);
        }
        stored += store.upsert_chunks(collection, batch)?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    info!("Indexed {} chunks into {}", stored, collection);
    Output::success(&format!(
        "Indexed {} chunks into '{}' ({} dimensions)",
        stored,
        collection,
        embedder.dimensions()
    ));
    Ok(())
}
