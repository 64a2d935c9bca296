//! Relevance classification.

use super::{Query, RelevanceLabel};
use crate::config::{vars, Prompts};
use crate::error::Result;
use crate::llm::{history_json, ChatMessage, ChatModel, CompletionRequest};
use crate::openai::bounded;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Single-shot classifier deciding whether a query gets retrieval.
pub struct RelevanceClassifier {
    model: Arc<dyn ChatModel>,
    model_name: String,
    prompts: Arc<Prompts>,
    history_window: usize,
    timeout: Duration,
}

impl RelevanceClassifier {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: &str,
        prompts: Arc<Prompts>,
        history_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            prompts,
            history_window,
            timeout,
        }
    }

    /// Classify `query` using the last few history turns.
    ///
    /// Unrecognized output maps to [`RelevanceLabel::NotRelevant`]; provider
    /// errors and timeouts are returned to the caller.
    #[instrument(skip(self, query), fields(history = query.history.len()))]
    pub async fn classify(&self, query: &Query) -> Result<RelevanceLabel> {
        let prompt = self.prompts.render_with_custom(
            &self.prompts.relevance.user,
            &vars([
                ("history", history_json(&query.history, self.history_window)),
                ("question", query.text.clone()),
            ]),
        );

        let request = CompletionRequest::new(&self.model_name, vec![ChatMessage::user(prompt)])
            .with_temperature(0.0);

        let raw = bounded("relevance", self.timeout, self.model.complete(request)).await?;
        let label = RelevanceLabel::from_model_output(&raw);

        debug!("Classified as {} (raw: {:?})", label, raw.trim());
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Reply, ScriptedChatModel};
    use super::*;
    use crate::error::JoineryError;

    fn classifier(model: Arc<ScriptedChatModel>, timeout: Duration) -> RelevanceClassifier {
        RelevanceClassifier::new(model, "classifier", Arc::new(Prompts::default()), 5, timeout)
    }

    #[tokio::test]
    async fn test_classify_uses_recent_history() {
        let model = Arc::new(ScriptedChatModel::new().with("classifier", Reply::text("RELEVANT")));
        let history: Vec<ChatMessage> = (0..7)
            .map(|i| ChatMessage::user(format!("turn-{}", i)))
            .collect();
        let query = Query::new("Which glue for oak?", history);

        let label = classifier(model.clone(), Duration::from_secs(1))
            .classify(&query)
            .await
            .unwrap();
        assert_eq!(label, RelevanceLabel::Relevant);

        let calls = model.calls_for("classifier");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, Some(0.0));
        let prompt = &calls[0].messages[0].content;
        assert!(prompt.contains("Current Question: Which glue for oak?"));
        assert!(prompt.contains("turn-6"));
        assert!(prompt.contains("turn-2"));
        assert!(!prompt.contains("turn-1"));
    }

    #[tokio::test]
    async fn test_unrecognized_output_defaults_to_not_relevant() {
        let model = Arc::new(ScriptedChatModel::new().with("classifier", Reply::text("UNSURE")));
        let label = classifier(model, Duration::from_secs(1))
            .classify(&Query::new("hmm", vec![]))
            .await
            .unwrap();
        assert_eq!(label, RelevanceLabel::NotRelevant);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let model = Arc::new(ScriptedChatModel::new().with("classifier", Reply::Fail));
        let result = classifier(model, Duration::from_secs(1))
            .classify(&Query::new("hello", vec![]))
            .await;
        assert!(matches!(result, Err(JoineryError::OpenAI(_))));
    }

    #[tokio::test]
    async fn test_timeout_propagates() {
        let model = Arc::new(ScriptedChatModel::new().with("classifier", Reply::Hang));
        let result = classifier(model, Duration::from_millis(20))
            .classify(&Query::new("hello", vec![]))
            .await;
        assert!(matches!(
            result,
            Err(JoineryError::Timeout { stage: "relevance", .. })
        ));
    }
}
