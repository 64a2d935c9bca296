//! Citation extraction and the follow-up citation request.
//!
//! Streaming an answer stores a [`PendingExtractionContext`] for the
//! session. A later citation request takes it, asks the extraction model
//! for markers, and correlates the cited videos with catalog products.

use super::markers::{parse_citation_markers, ParsedMarkers, VideoReferenceMap};
use super::pending::{PendingContextStore, PendingExtractionContext};
use super::products::ProductCorrelator;
use super::stats::PipelineStats;
use crate::catalog::Product;
use crate::config::{vars, Prompts};
use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest};
use crate::openai::bounded;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Asks the extraction model for citation markers and parses them.
pub struct CitationExtractor {
    model: Arc<dyn ChatModel>,
    model_name: String,
    prompts: Arc<Prompts>,
    timeout: Duration,
}

impl CitationExtractor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: &str,
        prompts: Arc<Prompts>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            prompts,
            timeout,
        }
    }

    /// Extract references for `answer` from the context it was grounded in.
    ///
    /// References whose title is absent from `context` are kept and counted
    /// in [`super::MarkerReport::unverified`].
    #[instrument(skip_all, fields(answer_len = answer.len()))]
    pub async fn extract(&self, context: &str, query: &str, answer: &str) -> Result<ParsedMarkers> {
        let user = self.prompts.render_with_custom(
            &self.prompts.citations.user,
            &vars([
                ("context", context.to_string()),
                ("query", query.to_string()),
                ("answer", answer.to_string()),
            ]),
        );
        let request = CompletionRequest::new(
            &self.model_name,
            vec![
                ChatMessage::system(self.prompts.citations.system.clone()),
                ChatMessage::user(user),
            ],
        )
        .with_temperature(EXTRACTION_TEMPERATURE);

        let raw = bounded("citation extraction", self.timeout, self.model.complete(request)).await?;

        let mut parsed = parse_citation_markers(&raw);
        parsed.report.unverified = parsed
            .references
            .iter()
            .filter(|r| !context.contains(&format!("Source: {}", r.video_title)))
            .count();

        if parsed.report.rejected > 0 {
            warn!("Skipped {} malformed citation markers", parsed.report.rejected);
        }
        if parsed.report.unverified > 0 {
            warn!(
                "{} citations name videos that are not in the retrieved context",
                parsed.report.unverified
            );
        }
        debug!("Extracted {} citations", parsed.report.accepted);
        Ok(parsed)
    }
}

/// Response body of a citation request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationPayload {
    pub video_references: VideoReferenceMap,
    pub related_products: Vec<Product>,
    pub status: &'static str,
}

impl CitationPayload {
    pub fn empty() -> Self {
        Self {
            status: "success",
            ..Self::default()
        }
    }
}

/// Holds pending contexts between answer streaming and citation requests.
pub struct CitationService {
    extractor: CitationExtractor,
    correlator: ProductCorrelator,
    pending: PendingContextStore,
    stats: Arc<PipelineStats>,
}

impl CitationService {
    pub fn new(
        extractor: CitationExtractor,
        correlator: ProductCorrelator,
        pending: PendingContextStore,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            extractor,
            correlator,
            pending,
            stats,
        }
    }

    /// Remember the grounding of an answer that is about to stream.
    pub fn prepare(&self, session_id: &str, context: &str, query: &str) {
        self.pending.put(
            session_id,
            PendingExtractionContext {
                context: context.to_string(),
                query: query.to_string(),
                answer: None,
            },
        );
    }

    /// Attach the finished answer to the session's pending context.
    pub fn record_answer(&self, session_id: &str, answer: &str) {
        if !self.pending.record_answer(session_id, answer) {
            debug!("No pending context to attach answer to for {}", session_id);
        }
    }

    /// Drop any pending context for the session.
    pub fn forget(&self, session_id: &str) {
        self.pending.take(session_id);
    }

    /// Produce citations for the session's last answer.
    ///
    /// Consumes the pending context. Never fails: a missing context or any
    /// extraction error yields an empty successful payload. `answer`, when
    /// given and non-empty, overrides the answer recorded while streaming.
    #[instrument(skip(self, answer))]
    pub async fn request(&self, session_id: &str, answer: Option<&str>) -> CitationPayload {
        self.stats.citation_request();

        let Some(pending) = self.pending.take(session_id) else {
            info!("No pending context for session {}", session_id);
            self.stats.pending_miss();
            return CitationPayload::empty();
        };

        let answer = answer
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or(pending.answer);
        let Some(answer) = answer else {
            info!("No answer recorded for session {}", session_id);
            return CitationPayload::empty();
        };

        let parsed = match self
            .extractor
            .extract(&pending.context, &pending.query, &answer)
            .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Citation extraction failed: {}", e);
                self.stats.extraction_failure();
                return CitationPayload::empty();
            }
        };
        self.stats.markers(&parsed.report);

        let related_products = self.correlator.correlate(&parsed.references.titles()).await;
        self.stats.products(related_products.len());

        CitationPayload {
            video_references: parsed.references,
            related_products,
            status: "success",
        }
    }

    pub fn pending_sessions(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{
        chisel_product, FailingCatalog, RecordingCatalog, Reply, ScriptedChatModel,
    };
    use super::*;
    use crate::catalog::ProductCatalog;

    const MARKERS: &str = "{{timestamp:05:30}}{{title:Workshop Tour}}{{url:https://youtube.com/abc}}{{description:Shows chisel sharpening.}}\n\
        {{timestamp:07:00}}{{title:Ghost Video}}{{url:https://youtube.com/zzz}}{{description:Made up}}\n\
        {{timestamp:08:00}}{{title:Workshop Tour}}{{description:No url}}";

    const CONTEXT: &str = "Source: Workshop Tour\nContent: At 05:30 the chisel is sharpened\nURL: https://youtube.com/abc";

    fn build(
        reply: Reply,
        catalog: Arc<dyn ProductCatalog>,
    ) -> (CitationService, Arc<ScriptedChatModel>, Arc<PipelineStats>) {
        let model = Arc::new(ScriptedChatModel::new().with("extractor", reply));
        let prompts = Arc::new(Prompts::default());
        let stats = Arc::new(PipelineStats::default());
        let service = CitationService::new(
            CitationExtractor::new(model.clone(), "extractor", prompts, Duration::from_millis(200)),
            ProductCorrelator::new(catalog),
            PendingContextStore::new(Duration::from_secs(60)),
            stats.clone(),
        );
        (service, model, stats)
    }

    #[tokio::test]
    async fn test_request_without_pending_context_is_empty_success() {
        let (service, model, stats) = build(Reply::text(MARKERS), Arc::new(FailingCatalog));

        let payload = service.request("nobody", Some("an answer")).await;
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"videoReferences": {}, "relatedProducts": [], "status": "success"})
        );
        assert!(model.calls_for("extractor").is_empty());
        assert_eq!(stats.snapshot().pending_misses, 1);
    }

    #[tokio::test]
    async fn test_request_extracts_and_correlates() {
        let catalog = Arc::new(RecordingCatalog::new(vec![chisel_product()]));
        let (service, model, stats) = build(Reply::text(MARKERS), catalog.clone());

        service.prepare("s1", CONTEXT, "bench chisel recommendations");
        service.record_answer("s1", "### 1. **Chisels**\n- Sharpen often");

        let payload = service.request("s1", None).await;
        assert_eq!(payload.status, "success");
        assert_eq!(payload.video_references.len(), 2);

        let first = payload.video_references.get("0").unwrap();
        assert_eq!(first.timestamp, "05:30");
        assert_eq!(first.description, "Chisel sharpening");
        assert_eq!(payload.related_products.len(), 1);
        assert_eq!(
            catalog.lookups(),
            vec![vec!["Workshop Tour".to_string(), "Ghost Video".to_string()]]
        );

        let calls = model.calls_for("extractor");
        assert_eq!(calls[0].temperature, Some(0.1));
        assert!(calls[0].messages[1].content.contains("AI Answer: ### 1. **Chisels**"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.markers_accepted, 2);
        assert_eq!(snapshot.markers_rejected, 1);
        assert_eq!(snapshot.markers_unverified, 1);
        assert_eq!(snapshot.products_matched, 1);

        // The context is consumed.
        assert_eq!(service.pending_sessions(), 0);
        assert!(service.request("s1", Some("again")).await.video_references.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_answer_overrides_recorded_one() {
        let (service, model, _) = build(Reply::text(""), Arc::new(FailingCatalog));
        service.prepare("s1", CONTEXT, "q");
        service.record_answer("s1", "recorded");

        service.request("s1", Some("from client")).await;
        let calls = model.calls_for("extractor");
        assert!(calls[0].messages[1].content.contains("AI Answer: from client"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_swallowed() {
        let (service, _, stats) = build(Reply::Hang, Arc::new(FailingCatalog));
        service.prepare("s1", CONTEXT, "q");

        let payload = service.request("s1", Some("answer")).await;
        assert!(payload.video_references.is_empty());
        assert!(payload.related_products.is_empty());
        assert_eq!(payload.status, "success");
        assert_eq!(stats.snapshot().extraction_failures, 1);
    }

    #[tokio::test]
    async fn test_catalog_failure_keeps_references() {
        let (service, _, _) = build(Reply::text(MARKERS), Arc::new(FailingCatalog));
        service.prepare("s1", CONTEXT, "q");

        let payload = service.request("s1", Some("answer")).await;
        assert_eq!(payload.video_references.len(), 2);
        assert!(payload.related_products.is_empty());
    }
}
