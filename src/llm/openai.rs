//! OpenAI chat completions implementation.

use super::{ChatMessage, ChatModel, CompletionRequest, Role, TokenStream};
use crate::error::{JoineryError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, instrument};

/// OpenAI-backed chat model.
pub struct OpenAIChatModel {
    client: Client<OpenAIConfig>,
}

impl OpenAIChatModel {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    fn build_request(request: &CompletionRequest, stream: bool) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model).messages(messages).stream(stream);
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }

        args.build()
            .map_err(|e| JoineryError::OpenAI(format!("Failed to build request: {}", e)))
    }
}

fn to_openai_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let built: ChatCompletionRequestMessage = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| JoineryError::OpenAI(e.to_string()))?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| JoineryError::OpenAI(e.to_string()))?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| JoineryError::OpenAI(e.to_string()))?
            .into(),
    };
    Ok(built)
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let request = Self::build_request(&request, false)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| JoineryError::OpenAI(format!("Chat completion failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        debug!("Completion returned {} chars", content.len());
        Ok(content)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        let request = Self::build_request(&request, true)?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| JoineryError::OpenAI(format!("Failed to open stream: {}", e)))?;

        let tokens = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(JoineryError::OpenAI(format!("Stream interrupted: {}", e)))),
            }
        });

        Ok(Box::pin(tokens))
    }
}
