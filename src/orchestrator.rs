//! Request orchestrator for Joinery.
//!
//! Runs one chat turn: classify, then either stream a canned reply or
//! rewrite, embed, retrieve and stream a grounded answer. Citations for the
//! answer are produced by a follow-up request (or in-band when
//! `rag.auto_citations` is set).

use crate::catalog::{PgProductCatalog, ProductCatalog, SqliteProductCatalog};
use crate::config::{Prompts, Settings, StoreProvider};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{ErrorPayload, JoineryError, Result};
use crate::llm::{ChatModel, OpenAIChatModel, TokenStream};
use crate::openai::create_client_with;
use crate::rag::context::format_context_for_prompt;
use crate::rag::{
    check_answer_format, AnswerGenerator, CitationExtractor, CitationPayload, CitationService,
    ContextBuilder, PendingContextStore, PipelineStats, ProductCorrelator, Query, QueryRewriter,
    RelevanceClassifier, RelevanceLabel, StatsSnapshot,
};
use crate::vector_store::{DocumentChunk, PgPool, PgVectorStore, SqliteVectorStore, VectorStore};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Where in a request a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Classifying,
    Rewriting,
    Embedding,
    Retrieving,
    StreamingAnswer,
    StreamingCanned,
}

impl RequestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Classifying => "relevance",
            RequestStage::Rewriting => "rewrite",
            RequestStage::Embedding => "embedding",
            RequestStage::Retrieving => "retrieval",
            RequestStage::StreamingAnswer => "answer",
            RequestStage::StreamingCanned => "canned",
        }
    }
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal request error tagged with the stage that raised it.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: RequestStage,
    #[source]
    pub source: JoineryError,
}

impl StageError {
    pub fn to_payload(&self) -> ErrorPayload {
        self.source.to_payload(Some(self.stage.as_str()))
    }
}

fn at(stage: RequestStage) -> impl FnOnce(JoineryError) -> StageError {
    move |source| StageError { stage, source }
}

/// One event of a chat response stream.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A fragment of the answer, in generation order.
    Token(String),
    /// In-band citations, sent after the last token.
    Citations(CitationPayload),
    /// The stream broke; no further events follow.
    Error(ErrorPayload),
    Done,
}

impl ChatEvent {
    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Token(_) => "token",
            ChatEvent::Citations(_) => "citations",
            ChatEvent::Error(_) => "error",
            ChatEvent::Done => "done",
        }
    }

    /// JSON body of the event.
    pub fn data(&self) -> String {
        let json = match self {
            ChatEvent::Token(token) => serde_json::to_string(token),
            ChatEvent::Citations(payload) => serde_json::to_string(payload),
            ChatEvent::Error(payload) => serde_json::to_string(payload),
            ChatEvent::Done => Ok("{}".to_string()),
        };
        json.unwrap_or_else(|_| "null".to_string())
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// The result of a chat turn. Metadata is known up front; content streams.
pub struct ChatResponse {
    pub session_id: String,
    pub label: RelevanceLabel,
    /// The rewritten query, when retrieval ran.
    pub search_query: Option<String>,
    /// Retrieved chunks, best first.
    pub sources: Vec<DocumentChunk>,
    pub events: EventStream,
}

/// Model and storage handles the orchestrator runs on.
pub struct Components {
    pub chat: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub catalog: Arc<dyn ProductCatalog>,
}

impl Components {
    /// Build OpenAI-backed models and the configured storage backend.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = create_client_with(
            settings.openai.api_base.as_deref(),
            Duration::from_secs(settings.openai.request_timeout_secs),
        )?;

        let chat: Arc<dyn ChatModel> = Arc::new(OpenAIChatModel::new(client.clone()));
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(client, &settings.embedding));

        let (vector_store, catalog): (Arc<dyn VectorStore>, Arc<dyn ProductCatalog>) =
            match settings.vector_store.provider {
                StoreProvider::Sqlite => {
                    let path = settings.sqlite_path();
                    info!("Using SQLite store at {}", path.display());
                    (
                        Arc::new(SqliteVectorStore::new(&path)?),
                        Arc::new(SqliteProductCatalog::new(&path)?),
                    )
                }
                StoreProvider::Postgres => {
                    let url = settings.postgres_url().ok_or_else(|| {
                        JoineryError::Config(
                            "postgres provider needs vector_store.postgres_url or POSTGRES_URL"
                                .to_string(),
                        )
                    })?;
                    let pool = Arc::new(PgPool::new(
                        &url,
                        settings.vector_store.max_connections,
                        Duration::from_secs(settings.vector_store.connect_timeout_secs),
                        settings.vector_store.idle_timeout(),
                    )?);
                    PgPool::spawn_reaper(&pool);
                    info!("Using Postgres store (pool size {})", pool.size());
                    (
                        Arc::new(PgVectorStore::new(pool.clone())),
                        Arc::new(PgProductCatalog::new(pool)),
                    )
                }
            };

        Ok(Self {
            chat,
            embedder,
            vector_store,
            catalog,
        })
    }
}

/// The main orchestrator for a chat turn.
pub struct Orchestrator {
    classifier: RelevanceClassifier,
    rewriter: QueryRewriter,
    context_builder: ContextBuilder,
    generator: AnswerGenerator,
    citations: Arc<CitationService>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    stats: Arc<PipelineStats>,
    auto_citations: bool,
}

impl Orchestrator {
    /// Create an orchestrator from configuration.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let components = Components::from_settings(settings)?;
        Ok(Self::with_components(settings, prompts, components))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(settings: &Settings, prompts: Prompts, components: Components) -> Self {
        let rag = &settings.rag;
        let prompts = Arc::new(prompts);
        let stats = Arc::new(PipelineStats::default());

        let citations = Arc::new(CitationService::new(
            CitationExtractor::new(
                components.chat.clone(),
                &rag.extraction_model,
                prompts.clone(),
                rag.extraction_timeout(),
            ),
            ProductCorrelator::new(components.catalog),
            PendingContextStore::new(rag.pending_ttl()),
            stats.clone(),
        ));

        Self {
            classifier: RelevanceClassifier::new(
                components.chat.clone(),
                &rag.classifier_model,
                prompts.clone(),
                rag.history_window,
                rag.classify_timeout(),
            ),
            rewriter: QueryRewriter::new(
                components.chat.clone(),
                &rag.rewrite_model,
                prompts.clone(),
                rag.rewrite_timeout(),
            ),
            context_builder: ContextBuilder::new(
                components.embedder,
                components.vector_store.clone(),
                &settings.vector_store.collection,
                settings.vector_store.top_k,
            ),
            generator: AnswerGenerator::new(
                components.chat,
                &rag.answer_model,
                prompts,
                rag.history_window,
                rag.answer_temperature,
            ),
            citations,
            vector_store: components.vector_store,
            collection: settings.vector_store.collection.clone(),
            stats,
            auto_citations: rag.auto_citations,
        }
    }

    /// Run one chat turn for `session_id`.
    ///
    /// Errors before the first token are returned; errors while streaming
    /// arrive as a [`ChatEvent::Error`] that ends the stream.
    #[instrument(skip(self, query), fields(session = %session_id))]
    pub async fn respond(
        &self,
        session_id: &str,
        query: &Query,
    ) -> std::result::Result<ChatResponse, StageError> {
        self.stats.request();
        let result = self.run(session_id, query).await;
        if let Err(e) = &result {
            self.stats.failed_request();
            error!("Request failed: {}", e);
        }
        result
    }

    async fn run(
        &self,
        session_id: &str,
        query: &Query,
    ) -> std::result::Result<ChatResponse, StageError> {
        if query.text.trim().is_empty() {
            return Err(StageError {
                stage: RequestStage::Classifying,
                source: JoineryError::InvalidInput("Query text is empty".to_string()),
            });
        }

        // A new turn invalidates citations for the previous answer.
        self.citations.forget(session_id);

        let label = self
            .classifier
            .classify(query)
            .await
            .map_err(at(RequestStage::Classifying))?;
        self.stats.label(label);
        info!("Query classified as {}", label);

        if label != RelevanceLabel::Relevant {
            let tokens = self
                .generator
                .stream_canned(label, query)
                .await
                .map_err(at(RequestStage::StreamingCanned))?;

            return Ok(ChatResponse {
                session_id: session_id.to_string(),
                label,
                search_query: None,
                sources: Vec::new(),
                events: event_stream(tokens, RequestStage::StreamingCanned, self.stats.clone(), None),
            });
        }

        let search_query = self.rewriter.rewrite(query).await;

        let embedding = self
            .context_builder
            .embed(&search_query)
            .await
            .map_err(at(RequestStage::Embedding))?;
        let sources = self
            .context_builder
            .retrieve(&embedding)
            .await
            .map_err(at(RequestStage::Retrieving))?;

        let context = format_context_for_prompt(&sources);
        if sources.is_empty() {
            warn!("No transcript chunks retrieved for {:?}", search_query);
        } else {
            self.citations.prepare(session_id, &context, &search_query);
        }

        let tokens = self
            .generator
            .stream_answer(query, &context)
            .await
            .map_err(at(RequestStage::StreamingAnswer))?;

        let finish = AnswerFinish {
            session_id: session_id.to_string(),
            citations: self.citations.clone(),
            auto_citations: self.auto_citations,
        };

        Ok(ChatResponse {
            session_id: session_id.to_string(),
            label,
            search_query: Some(search_query),
            sources,
            events: event_stream(
                tokens,
                RequestStage::StreamingAnswer,
                self.stats.clone(),
                Some(finish),
            ),
        })
    }

    /// Citations for the session's last answer. Never fails.
    pub async fn request_citations(&self, session_id: &str, answer: Option<&str>) -> CitationPayload {
        self.citations.request(session_id, answer).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pending_sessions(&self) -> usize {
        self.citations.pending_sessions()
    }

    /// Number of chunks in the configured collection.
    pub async fn indexed_chunks(&self) -> Result<usize> {
        self.vector_store.count(&self.collection).await
    }
}

/// Post-stream work for a grounded answer.
struct AnswerFinish {
    session_id: String,
    citations: Arc<CitationService>,
    auto_citations: bool,
}

fn event_stream(
    mut tokens: TokenStream,
    stage: RequestStage,
    stats: Arc<PipelineStats>,
    finish: Option<AnswerFinish>,
) -> EventStream {
    Box::pin(stream! {
        let mut answer = String::new();

        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => {
                    answer.push_str(&token);
                    yield ChatEvent::Token(token);
                }
                Err(e) => {
                    stats.stream_error();
                    error!("Stream failed during {}: {}", stage, e);
                    yield ChatEvent::Error(e.to_payload(Some(stage.as_str())));
                    return;
                }
            }
        }

        if let Some(finish) = finish {
            let report = check_answer_format(&answer);
            if !report.is_compliant() {
                stats.format_violation();
                warn!("Answer layout issues: {:?}", report.issues);
            }

            finish.citations.record_answer(&finish.session_id, &answer);
            if finish.auto_citations {
                let payload = finish.citations.request(&finish.session_id, None).await;
                yield ChatEvent::Citations(payload);
            }
        }

        yield ChatEvent::Done;
    })
}
