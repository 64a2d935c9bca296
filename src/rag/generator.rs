//! Streamed answer generation and answer format checks.

use super::{Query, RelevanceLabel};
use crate::config::{vars, Prompts};
use crate::error::Result;
use crate::llm::{history_json, ChatMessage, ChatModel, CompletionRequest, TokenStream};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument};

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^### \d+\. \*\*[^*]+\*\*\s*$").expect("header pattern is valid")
});

/// Streams answers grounded in retrieved context, or a canned reply.
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    model_name: String,
    prompts: Arc<Prompts>,
    history_window: usize,
    temperature: Option<f32>,
}

impl AnswerGenerator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: &str,
        prompts: Arc<Prompts>,
        history_window: usize,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            prompts,
            history_window,
            temperature,
        }
    }

    fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        let request = CompletionRequest::new(&self.model_name, messages);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }

    /// Messages for a grounded answer: the formatting system prompt plus
    /// history, context and question.
    pub fn answer_messages(&self, query: &Query, context: &str) -> Vec<ChatMessage> {
        let user = self.prompts.render_with_custom(
            &self.prompts.answer.user,
            &vars([
                ("history", history_json(&query.history, self.history_window)),
                ("context", context.to_string()),
                ("question", query.text.clone()),
            ]),
        );
        vec![
            ChatMessage::system(self.prompts.answer.system.clone()),
            ChatMessage::user(user),
        ]
    }

    /// Start streaming an answer for a relevant query.
    #[instrument(skip_all, fields(context_len = context.len()))]
    pub async fn stream_answer(&self, query: &Query, context: &str) -> Result<TokenStream> {
        let messages = self.answer_messages(query, context);
        self.model.stream(self.request(messages)).await
    }

    /// Start streaming the canned reply for a non-retrieval label.
    ///
    /// `Relevant` has no canned prompt and falls back to the not-relevant one.
    pub async fn stream_canned(&self, label: RelevanceLabel, query: &Query) -> Result<TokenStream> {
        let template = match label {
            RelevanceLabel::Greeting => &self.prompts.canned.greeting,
            RelevanceLabel::Inappropriate => &self.prompts.canned.inappropriate,
            RelevanceLabel::NotRelevant | RelevanceLabel::Relevant => {
                &self.prompts.canned.not_relevant
            }
        };
        let prompt = self
            .prompts
            .render_with_custom(template, &vars([("question", query.text.clone())]));

        debug!("Streaming canned reply for {}", label);
        self.model
            .stream(self.request(vec![ChatMessage::user(prompt)]))
            .await
    }
}

/// A deviation from the answer layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatIssue {
    /// No `### N. **Title**` header anywhere.
    MissingSectionHeader,
    /// A `### ` line that is not a numbered bold header.
    MalformedHeader { line: usize },
    /// Bold markup inside a bullet.
    BoldInBullet { line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatReport {
    pub section_headers: usize,
    pub issues: Vec<FormatIssue>,
}

impl FormatReport {
    pub fn is_compliant(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check a finished answer against the section and bullet layout.
///
/// Line numbers are 1-based.
pub fn check_answer_format(answer: &str) -> FormatReport {
    let mut report = FormatReport::default();

    for (i, line) in answer.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();

        if trimmed.starts_with("### ") {
            if SECTION_HEADER.is_match(trimmed) {
                report.section_headers += 1;
            } else {
                report.issues.push(FormatIssue::MalformedHeader { line: line_no });
            }
        } else if trimmed.starts_with("- ") && trimmed.contains("**") {
            report.issues.push(FormatIssue::BoldInBullet { line: line_no });
        }
    }

    if report.section_headers == 0 {
        report.issues.insert(0, FormatIssue::MissingSectionHeader);
    }

    report
}
