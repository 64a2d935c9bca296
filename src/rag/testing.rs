//! Scripted stand-ins for the model, embedder, store and catalog.

use crate::catalog::{MemoryCatalog, Product, ProductCatalog};
use crate::embedding::Embedder;
use crate::error::{JoineryError, Result};
use crate::llm::{ChatModel, CompletionRequest, TokenStream};
use crate::vector_store::{ChunkRecord, DocumentChunk, MemoryVectorStore, VectorStore};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const DIMS: usize = 1536;

/// What the scripted model does when called with a given model name.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Tokens(Vec<String>),
    TokensThenFail(Vec<String>),
    /// Successive calls get successive texts; the last one repeats.
    Seq(Vec<String>),
    Fail,
    Hang,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    pub fn tokens(tokens: &[&str]) -> Self {
        Reply::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// Chat model that answers by model name and records every request.
#[derive(Default)]
pub struct ScriptedChatModel {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: &str, reply: Reply) -> Self {
        self.replies.insert(model.to_string(), reply);
        self
    }

    pub fn calls_for(&self, model: &str) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.model == model)
            .cloned()
            .collect()
    }

    fn reply_for(&self, request: CompletionRequest) -> Result<Reply> {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.iter().filter(|c| c.model == request.model).count();
        calls.push(request.clone());

        let reply = self.replies.get(&request.model).cloned().ok_or_else(|| {
            JoineryError::OpenAI(format!("no reply scripted for {}", request.model))
        })?;
        Ok(match reply {
            Reply::Seq(texts) => Reply::Text(
                texts
                    .get(n)
                    .or_else(|| texts.last())
                    .cloned()
                    .unwrap_or_default(),
            ),
            other => other,
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        match self.reply_for(request)? {
            Reply::Text(text) => Ok(text),
            Reply::Tokens(tokens) => Ok(tokens.concat()),
            Reply::TokensThenFail(_) | Reply::Fail => {
                Err(JoineryError::OpenAI("scripted failure".to_string()))
            }
            Reply::Seq(_) => unreachable!("resolved in reply_for"),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        let items: Vec<Result<String>> = match self.reply_for(request)? {
            Reply::Text(text) => text.split_inclusive(' ').map(|t| Ok(t.to_string())).collect(),
            Reply::Tokens(tokens) => tokens.into_iter().map(Ok).collect(),
            Reply::TokensThenFail(tokens) => tokens
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(JoineryError::OpenAI(
                    "Stream interrupted".to_string(),
                ))))
                .collect(),
            Reply::Seq(_) => unreachable!("resolved in reply_for"),
            Reply::Fail => return Err(JoineryError::OpenAI("scripted failure".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Vec::new()
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Embedder returning the unit vector `[1, 0, 0, ...]` and counting calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingEmbedder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(JoineryError::Embedding("scripted failure".to_string()));
        }
        let mut vector = vec![0.0; DIMS];
        vector[0] = 1.0;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Memory store that counts searches.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryVectorStore,
    pub searches: AtomicUsize,
}

impl CountingStore {
    /// Store holding `n` transcript chunks in `collection`.
    pub fn seeded(collection: &str, n: usize) -> Self {
        let store = Self::default();
        store
            .inner
            .insert(collection, transcript_chunks(n))
            .unwrap();
        store
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query_embedding, collection, top_k).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }
}

/// `n` chunks with 1536-d vectors; chunk 0 is titled "Workshop Tour".
pub fn transcript_chunks(n: usize) -> Vec<ChunkRecord> {
    (0..n)
        .map(|i| {
            let angle = (i as f32) * 0.05;
            let mut vector = vec![0.0; DIMS];
            vector[0] = angle.cos();
            vector[1] = angle.sin();
            let title = if i == 0 {
                "Workshop Tour".to_string()
            } else {
                format!("Shop Video {}", i)
            };
            ChunkRecord {
                id: format!("doc-{:02}", i),
                text: format!("At 05:30 the chisel is sharpened on a stone ({})", i),
                title,
                url: format!("https://youtube.com/watch?v=v{}", i),
                chunk_id: format!("c{}", i),
                vector: Some(vector),
            }
        })
        .collect()
}

/// Catalog whose lookups always fail.
pub struct FailingCatalog;

#[async_trait]
impl ProductCatalog for FailingCatalog {
    async fn find_by_titles(&self, _titles: &[String]) -> Result<Vec<Product>> {
        Err(JoineryError::Catalog("connection refused".to_string()))
    }
}

/// Catalog that records every lookup.
#[derive(Default)]
pub struct RecordingCatalog {
    inner: MemoryCatalog,
    lookups: Mutex<Vec<Vec<String>>>,
}

impl RecordingCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            inner: MemoryCatalog::new(products),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<Vec<String>> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductCatalog for RecordingCatalog {
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Product>> {
        self.lookups.lock().unwrap().push(titles.to_vec());
        self.inner.find_by_titles(titles).await
    }
}

pub fn chisel_product() -> Product {
    Product {
        id: "p-chisel".to_string(),
        title: "Bench Chisel Set".to_string(),
        tags: vec!["workshop tour".to_string(), "hand tools".to_string()],
        link: "https://shop.example/chisels".to_string(),
    }
}
