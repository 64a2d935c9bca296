//! RAG (Retrieval-Augmented Generation) pipeline components.
//!
//! Each stage is a small struct holding its model handle, prompt set and
//! bounds; the [`crate::orchestrator::Orchestrator`] sequences them.

mod classifier;
pub mod context;
mod extractor;
mod generator;
pub mod markers;
mod pending;
mod products;
mod rewriter;
mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::RelevanceClassifier;
pub use context::ContextBuilder;
pub use extractor::{CitationExtractor, CitationPayload, CitationService};
pub use generator::{check_answer_format, AnswerGenerator, FormatIssue, FormatReport};
pub use markers::{parse_citation_markers, MarkerReport, ParsedMarkers, VideoReference, VideoReferenceMap};
pub use pending::{PendingContextStore, PendingExtractionContext};
pub use products::ProductCorrelator;
pub use rewriter::QueryRewriter;
pub use stats::{PipelineStats, StatsSnapshot};

use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Outcome of relevance classification; decides whether retrieval runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceLabel {
    Greeting,
    Relevant,
    Inappropriate,
    NotRelevant,
}

impl RelevanceLabel {
    /// Read a label from free-form model output.
    ///
    /// Only the first token counts; `NOT RELEVANT` is accepted as two words.
    /// Anything unrecognized is `NotRelevant`.
    pub fn from_model_output(text: &str) -> Self {
        let upper = text.trim().to_uppercase();
        let mut tokens = upper
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty());

        match tokens.next() {
            Some("GREETING") => RelevanceLabel::Greeting,
            Some("RELEVANT") => RelevanceLabel::Relevant,
            Some("INAPPROPRIATE") => RelevanceLabel::Inappropriate,
            _ => RelevanceLabel::NotRelevant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLabel::Greeting => "GREETING",
            RelevanceLabel::Relevant => "RELEVANT",
            RelevanceLabel::Inappropriate => "INAPPROPRIATE",
            RelevanceLabel::NotRelevant => "NOT_RELEVANT",
        }
    }
}

impl std::fmt::Display for RelevanceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted question with the conversation it belongs to.
#[derive(Debug, Clone)]
pub struct Query {
    /// The question text.
    pub text: String,
    /// Conversation so far, oldest first.
    pub history: Vec<ChatMessage>,
}

impl Query {
    pub fn new(text: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self {
            text: text.into(),
            history,
        }
    }

    /// Use the last user message as the question and all messages as history.
    ///
    /// Returns `None` when there is no non-empty user message.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Option<Self> {
        let text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim().to_string())
            .filter(|t| !t.is_empty())?;

        Some(Self {
            text,
            history: messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_model_output() {
        assert_eq!(RelevanceLabel::from_model_output("RELEVANT"), RelevanceLabel::Relevant);
        assert_eq!(RelevanceLabel::from_model_output(" greeting.\n"), RelevanceLabel::Greeting);
        assert_eq!(
            RelevanceLabel::from_model_output("INAPPROPRIATE - harmful request"),
            RelevanceLabel::Inappropriate
        );
        assert_eq!(
            RelevanceLabel::from_model_output("NOT_RELEVANT"),
            RelevanceLabel::NotRelevant
        );
        assert_eq!(
            RelevanceLabel::from_model_output("NOT RELEVANT"),
            RelevanceLabel::NotRelevant
        );
        assert_eq!(RelevanceLabel::from_model_output(""), RelevanceLabel::NotRelevant);
        assert_eq!(
            RelevanceLabel::from_model_output("Maybe relevant?"),
            RelevanceLabel::NotRelevant
        );
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(
            serde_json::to_string(&RelevanceLabel::NotRelevant).unwrap(),
            "\"NOT_RELEVANT\""
        );
        assert_eq!(RelevanceLabel::Relevant.to_string(), "RELEVANT");
    }

    #[test]
    fn test_query_from_messages() {
        let messages = vec![
            ChatMessage::user("How do I flatten a board?"),
            ChatMessage::assistant("Use a jointer or hand plane."),
            ChatMessage::user("  What chisel should I buy?  "),
        ];
        let query = Query::from_messages(messages).unwrap();
        assert_eq!(query.text, "What chisel should I buy?");
        assert_eq!(query.history.len(), 3);

        assert!(Query::from_messages(vec![ChatMessage::assistant("hi")]).is_none());
        assert!(Query::from_messages(vec![ChatMessage::user("   ")]).is_none());
    }
}
