//! Prompt templates for Joinery.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub relevance: RelevancePrompts,
    pub rewrite: RewritePrompts,
    pub answer: AnswerPrompts,
    pub canned: CannedPrompts,
    pub citations: CitationPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompt for relevance classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevancePrompts {
    pub user: String,
}

impl Default for RelevancePrompts {
    fn default() -> Self {
        Self {
            user: r#"Given this question and chat history, determine if it is:
1. A greeting/send-off (GREETING)
2. Related to woodworking/tools/company (RELEVANT)
3. Inappropriate content (INAPPROPRIATE)
4. Unrelated (NOT_RELEVANT)

Chat History: {{history}}
Current Question: {{question}}

Response (GREETING, RELEVANT, INAPPROPRIATE, or NOT_RELEVANT):"#
                .to_string(),
        }
    }
}

/// Prompt for query rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewritePrompts {
    pub user: String,
}

impl Default for RewritePrompts {
    fn default() -> Self {
        Self {
            user: r#"You are bent's woodworks assistant so question will be related to wood shop.
Rewrite the user query to make it more specific and searchable, taking into account
the chat history if provided. Only return the rewritten query without any explanations.

Original query: {{query}}
Chat history: {{history}}

Rewritten query:"#
                .to_string(),
        }
    }
}

/// Prompts for the streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AnswerPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an AI assistant representing Jason Bent's woodworking expertise. Your role is to:
1. Analyze woodworking documents and provide clear, natural responses that sound like Jason Bent is explaining the concepts.
2. Convert technical content into conversational, easy-to-understand explanations.
3. Focus on explaining the core concepts and techniques rather than quoting directly from transcripts.
4. Always maintain a friendly, professional tone as if Jason Bent is speaking directly to the user.
5. Organize multi-part responses clearly with natural transitions.
6. Keep responses concise and focused on the specific question asked.
7. If information isn't available in the provided context, clearly state that.
8. Always respond in English, regardless of the input language.
9. Avoid using phrases like "in the video" or "the transcript shows" - instead, speak directly about the techniques and concepts.

Response Structure and Formatting:
   - Use markdown formatting with clear hierarchical structure
   - Each major section must start with '### ' followed by a number and bold title
   - Format section headers as: ### 1. **Title Here**
   - Use bullet points (-) for detailed explanations under each section
   - Each bullet point must contain 2-3 sentences minimum with examples
   - Add blank lines between major sections only
   - Indent bullet points with proper spacing
   - Do NOT use bold formatting (**) or line breaks within bullet point content
   - Bold formatting should ONLY be used in section headers
   - Keep all content within a bullet point on the same line
   - Any asterisks (*) in the content should be treated as literal characters, not formatting

Remember:
- You are speaking as Jason Bent's AI assistant, so when mentioning him say "Jason Bent" instead of "I", like "Jason Bent will suggest that you..."
- Focus on analyzing the transcripts and explaining the concepts naturally rather than quoting transcripts
- Keep responses clear, practical, and focused on woodworking expertise"#
                .to_string(),

            user: r#"Chat History:
{{history}}

Context:
{{context}}

Question: {{question}}"#
                .to_string(),
        }
    }
}

/// Prompts for the non-retrieval branches, one per relevance label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CannedPrompts {
    pub greeting: String,
    pub inappropriate: String,
    pub not_relevant: String,
}

impl Default for CannedPrompts {
    fn default() -> Self {
        Self {
            greeting: "The following message is a greeting or casual message. Please provide a friendly and engaging response: {{question}}".to_string(),

            inappropriate: r#"Please respond with the following message: "I apologize, but I cannot assist with inappropriate content or queries that could cause harm. I'm here to help with woodworking and furniture making questions only.""#.to_string(),

            not_relevant: r#"The following question is not directly related to woodworking or the assistant's expertise. Provide a direct response that:
1. Politely acknowledges the question
2. Explains that you are specialized in woodworking and Jason Bent's content
3. Asks them to rephrase their question to relate to woodworking topics
Question: {{question}}"#
                .to_string(),
        }
    }
}

/// Prompts for video citation extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationPrompts {
    pub system: String,
    pub user: String,
}

impl Default for CitationPrompts {
    fn default() -> Self {
        Self {
            system: r#"Based on the provided context and question, identify relevant video references.
For each relevant point, you must provide all four pieces in this exact format:
{{timestamp:MM:SS}}{{title:EXACT Video Title}}{{url:EXACT YouTube URL}}{{description:EXACT CONTENT}}

Rules:
1. Only include videos that are directly relevant to the question
2. Each video reference must be on its own line
3. Must include all four pieces (timestamp, title, URL, description) for each reference
4. Only extract videos and timestamps that are explicitly mentioned in the provided context
5. You must use the EXACT timestamp mentioned in the context - DO NOT make up or estimate timestamps
6. Each timestamp must precisely match the timestamp mentioned in the context for that specific content
7. Format must be exact - no spaces between the parts
8. The description must be concise and exactly what content is shown at that timestamp. Don't make it too long.
9. Never default to video start times or guess timestamps
10. Titles must be copied verbatim from the "Source:" lines of the context
11. Each reference should look like: {{timestamp:05:30}}{{title:Workshop Tour}}{{url:https://youtube.com/...}}{{description:Demonstration of workbench setup}}

Example:
Context: "At 12:45 in Workshop Basics (https://yt.com/abc), Ben shows chisel sharpening. Later at 15:20, he demonstrates using the chisel."
Should output:
{{timestamp:12:45}}{{title:Workshop Basics}}{{url:https://yt.com/abc}}{{description:Demonstration of chisel sharpening technique}}
{{timestamp:15:20}}{{title:Workshop Basics}}{{url:https://yt.com/abc}}{{description:Demonstration of proper chisel usage}}

Important: Make sure to extract the EXACT timestamp where each specific topic or content is discussed. Don't default to video start times."#
                .to_string(),

            user: r#"Context:
{{context}}

Original Question: {{query}}

AI Answer: {{answer}}

Extract relevant video references:"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            if let Some(content) = read_override(&custom_path, "relevance.toml")? {
                prompts.relevance = toml::from_str(&content)?;
            }
            if let Some(content) = read_override(&custom_path, "rewrite.toml")? {
                prompts.rewrite = toml::from_str(&content)?;
            }
            if let Some(content) = read_override(&custom_path, "answer.toml")? {
                prompts.answer = toml::from_str(&content)?;
            }
            if let Some(content) = read_override(&custom_path, "canned.toml")? {
                prompts.canned = toml::from_str(&content)?;
            }
            if let Some(content) = read_override(&custom_path, "citations.toml")? {
                prompts.citations = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are resolved in a single left-to-right pass: substituted
    /// values are never scanned again, and unknown placeholders are kept as-is.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match vars.get(key) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push_str("{{");
                            result.push_str(key);
                            result.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

fn read_override(dir: &std::path::Path, file: &str) -> crate::error::Result<Option<String>> {
    let path = dir.join(file);
    if path.exists() {
        Ok(Some(std::fs::read_to_string(&path)?))
    } else {
        Ok(None)
    }
}

/// Build a variable map from `(name, value)` pairs.
pub fn vars<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.relevance.user.contains("NOT_RELEVANT"));
        assert!(prompts.answer.system.contains("### 1. **Title Here**"));
        assert!(prompts.citations.system.contains("{{description:"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let result = Prompts::render(
            template,
            &vars([("name", "Alice".to_string()), ("count", "5".to_string())]),
        );
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let template = "Context: {{context}}\nQuestion: {{question}}";
        let result = Prompts::render(
            template,
            &vars([
                ("context", "see {{question}} and {{timestamp:05:30}}".to_string()),
                ("question", "Which plane?".to_string()),
            ]),
        );
        assert_eq!(
            result,
            "Context: see {{question}} and {{timestamp:05:30}}\nQuestion: Which plane?"
        );
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed() {
        let result = Prompts::render("{{a}} {{b}} {{c", &vars([("a", "1".to_string())]));
        assert_eq!(result, "1 {{b}} {{c");
    }

    #[test]
    fn test_custom_variables_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("canned.toml"),
            "greeting = \"Hi from {{shop}}: {{question}}\"\n",
        )
        .unwrap();

        let mut custom = HashMap::new();
        custom.insert("shop".to_string(), "Bent's Woodworking".to_string());

        let prompts = Prompts::load(dir.path().to_str(), Some(&custom)).unwrap();
        let rendered = prompts.render_with_custom(
            &prompts.canned.greeting,
            &vars([("question", "hello".to_string())]),
        );
        assert_eq!(rendered, "Hi from Bent's Woodworking: hello");
        // Fields missing from an override file keep their defaults.
        assert_eq!(
            prompts.canned.not_relevant,
            CannedPrompts::default().not_relevant
        );
        assert_eq!(prompts.answer.system, AnswerPrompts::default().system);
    }
}
