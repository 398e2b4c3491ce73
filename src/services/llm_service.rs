use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::{LlmProvider, RetrievalChunk};
use crate::utils::error::ApiError;
use anyhow::{anyhow, Context, Result};
use futures::stream::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Non-streaming completion, used by planner/summary/verification call sites.
    pub async fn generate_chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        self.complete(messages, self.config.max_tokens, 0.3).await
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, ApiError> {
        let request = ChatCompletionRequest {
            messages,
            max_tokens,
            temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse LLM response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApiError::LlmError("LLM returned no choices".to_string()))
    }

    /// Generate completion with streaming, parsed from SSE chunks.
    pub async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>, ApiError> {
        debug!("Starting chat stream with {} messages", messages.len());

        let request = ChatCompletionRequest {
            messages,
            max_tokens,
            temperature,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        let stream = response.bytes_stream();

        let parsed_stream = futures::stream::unfold(stream, |mut stream| async move {
            use futures::StreamExt;

            match stream.next().await {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);

                    for line in text.lines() {
                        if let Some(json_str) = line.strip_prefix("data: ") {
                            if json_str == "[DONE]" {
                                return None;
                            }

                            if let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(json_str) {
                                if let Some(content) = chunk
                                    .choices
                                    .first()
                                    .and_then(|c| c.delta.content.as_ref())
                                {
                                    return Some((Ok(content.clone()), stream));
                                }
                            }
                        }
                    }

                    Some((Ok(String::new()), stream))
                }
                Some(Err(e)) => Some((Err(ApiError::LlmError(format!("Stream error: {}", e))), stream)),
                None => None,
            }
        });

        Ok(Box::pin(parsed_stream))
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.complete(messages.to_vec(), self.config.max_tokens, 0.3)
            .await
            .context("LLM generate failed")
    }

    async fn generate_with(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        self.complete(messages.to_vec(), max_tokens, temperature)
            .await
            .context("LLM generate_with failed")
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, anyhow::Error>> + Send>>> {
        let inner = self
            .chat_stream(messages.to_vec(), self.config.max_tokens, 0.7)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;

        use futures::StreamExt;
        let mapped = inner.map(|r| r.map_err(|e| anyhow!(e.to_string())));
        Ok(Box::pin(mapped))
    }

    async fn summarize_chunks(&self, chunks: &[RetrievalChunk], query: &str) -> Result<String> {
        let context = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Ringkas cuplikan dokumen berikut agar relevan untuk menjawab: \"{}\"\n\n{}",
            query, context
        );

        self.generate(&[ChatMessage::user(prompt)]).await
    }
}
