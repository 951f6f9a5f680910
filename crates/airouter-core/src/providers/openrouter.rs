//! OpenRouter backend (OpenAI chat-completions wire format)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ProviderError};
use crate::stream::TokenSink;
use crate::types::{ChatMessage, ChatRole};

use super::sse::{SseChunk, collect_sse};
use super::types::LlmProvider;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const PROVIDER_NAME: &str = "openrouter";

/// OpenRouter backend
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
    /// Sent as `HTTP-Referer` for OpenRouter app attribution
    referer: Option<String>,
    /// Sent as `X-Title`
    title: Option<String>,
}

impl std::fmt::Debug for OpenRouterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterProvider")
            .field("base_url", &self.base_url)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl OpenRouterProvider {
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        if api_key.is_empty() {
            warn!("OpenRouter API key is not set; OpenRouter requests will fail until OPEN_ROUTER_API_KEY is configured");
        }

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: None,
            title: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Optional identification headers. Empty strings are ignored.
    pub fn with_identification(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer.filter(|s| !s.is_empty());
        self.title = title.filter(|s| !s.is_empty());
        self
    }

    fn to_openai_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage<'_>> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect()
    }

    fn from_openai_response(resp: OpenAiApiResponse) -> Result<String, ProviderError> {
        if let Some(error) = resp.error {
            return Err(error.into_provider_error());
        }
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                "OpenRouter response had no content",
            ));
        }
        Ok(content)
    }

    fn parse_stream_chunk(data: &str) -> Result<SseChunk, ProviderError> {
        if data == "[DONE]" {
            return Ok(SseChunk::Done);
        }
        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
                return Ok(SseChunk::Skip);
            }
        };
        if let Some(error) = chunk.error {
            return Err(error.into_provider_error());
        }
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|t| !t.is_empty())
            .map_or(SseChunk::Skip, SseChunk::Text))
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sink: Option<&dyn TokenSink>,
    ) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Unauthorized,
                "OPEN_ROUTER_API_KEY is not configured",
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let streaming = sink.is_some();
        let body = OpenAiRequest {
            model,
            messages: Self::to_openai_messages(messages),
            stream: streaming.then_some(true),
        };

        debug!(
            "OpenRouter request: model={}, messages={}, stream={}",
            model,
            body.messages.len(),
            streaming
        );

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                &error_text,
            ));
        }

        if streaming {
            return collect_sse(PROVIDER_NAME, response, sink, Self::parse_stream_chunk).await;
        }

        let api_response: OpenAiApiResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                format!("Failed to parse OpenRouter API response: {e}"),
            )
        })?;

        debug!(
            "OpenRouter response: choices={}",
            api_response.choices.len()
        );

        Self::from_openai_response(api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    error: Option<OpenRouterErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenRouterErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// OpenRouter can report upstream failures inside a 200 body
#[derive(Debug, Deserialize)]
struct OpenRouterErrorBody {
    #[serde(default)]
    message: String,
    code: Option<u16>,
}

impl OpenRouterErrorBody {
    fn into_provider_error(self) -> ProviderError {
        match self.code {
            Some(code) => ProviderError::from_status(PROVIDER_NAME, code, &self.message),
            None => ProviderError::new(PROVIDER_NAME, ErrorKind::Other, self.message),
        }
    }
}
