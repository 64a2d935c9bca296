//! Query rewriting for retrieval.

use super::Query;
use crate::config::{vars, Prompts};
use crate::llm::{history_json, ChatMessage, ChatModel, CompletionRequest};
use crate::openai::bounded;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Turns a conversational question into a standalone search query.
///
/// Sees the whole conversation, unlike the classifier and generator.
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
    model_name: String,
    prompts: Arc<Prompts>,
    timeout: Duration,
}

impl QueryRewriter {
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

    /// Rewrite `query`, falling back to the original text on any failure.
    pub async fn rewrite(&self, query: &Query) -> String {
        let prompt = self.prompts.render_with_custom(
            &self.prompts.rewrite.user,
            &vars([
                ("query", query.text.clone()),
                ("history", history_json(&query.history, query.history.len())),
            ]),
        );

        let request = CompletionRequest::new(&self.model_name, vec![ChatMessage::user(prompt)])
            .with_temperature(0.0);

        match bounded("rewrite", self.timeout, self.model.complete(request)).await {
            Ok(raw) => match clean_rewrite(&raw) {
                Some(rewritten) => {
                    debug!("Rewrote {:?} -> {:?}", query.text, rewritten);
                    rewritten
                }
                None => {
                    warn!("Rewrite was empty, using original query");
                    query.text.clone()
                }
            },
            Err(e) => {
                warn!("Query rewrite failed, using original query: {}", e);
                query.text.clone()
            }
        }
    }
}

fn clean_rewrite(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("Rewritten query:") {
        text = rest.trim();
    }
    let text = text.trim_matches('"').trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Reply, ScriptedChatModel};
    use super::*;

    fn rewriter(reply: Reply, timeout: Duration) -> (QueryRewriter, Arc<ScriptedChatModel>) {
        let model = Arc::new(ScriptedChatModel::new().with("rewriter", reply));
        let rewriter = QueryRewriter::new(
            model.clone(),
            "rewriter",
            Arc::new(Prompts::default()),
            timeout,
        );
        (rewriter, model)
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(
            clean_rewrite("Rewritten query: best bench chisel for beginners\n").as_deref(),
            Some("best bench chisel for beginners")
        );
        assert_eq!(clean_rewrite("\"dovetail saw\"").as_deref(), Some("dovetail saw"));
        assert_eq!(clean_rewrite("   "), None);
        assert_eq!(clean_rewrite("Rewritten query:"), None);
    }

    #[tokio::test]
    async fn test_rewrite_success() {
        let (rewriter, model) = rewriter(
            Reply::text("bench chisel recommendations"),
            Duration::from_secs(1),
        );
        let query = Query::new("What chisel should I buy?", vec![]);
        assert_eq!(rewriter.rewrite(&query).await, "bench chisel recommendations");

        let calls = model.calls_for("rewriter");
        assert!(calls[0].messages[0]
            .content
            .contains("Original query: What chisel should I buy?"));
    }

    #[tokio::test]
    async fn test_rewrite_sees_full_history() {
        let (rewriter, model) = rewriter(Reply::text("dovetail jig"), Duration::from_secs(1));
        let history: Vec<ChatMessage> = (0..7)
            .map(|i| ChatMessage::user(format!("turn-{}", i)))
            .collect();
        let query = Query::new("and for half-blind ones?", history);

        rewriter.rewrite(&query).await;

        let calls = model.calls_for("rewriter");
        let prompt = &calls[0].messages[0].content;
        assert!(prompt.contains("turn-0"));
        assert!(prompt.contains("turn-6"));
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_on_failure() {
        let query = Query::new("What chisel should I buy?", vec![]);

        let (failing, _) = rewriter(Reply::Fail, Duration::from_secs(1));
        assert_eq!(failing.rewrite(&query).await, query.text);

        let (hanging, _) = rewriter(Reply::Hang, Duration::from_millis(20));
        assert_eq!(hanging.rewrite(&query).await, query.text);

        let (empty, _) = rewriter(Reply::text("  "), Duration::from_secs(1));
        assert_eq!(empty.rewrite(&query).await, query.text);
    }
}
