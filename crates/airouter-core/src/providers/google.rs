//! Google Gemini backend

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

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER_NAME: &str = "gemini";

/// Google Gemini backend
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl GeminiProvider {
    /// `timeout` bounds each HTTP attempt, including streamed bodies
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        if api_key.is_empty() {
            warn!("Gemini API key is not set; Gemini requests will fail until GEMINI_API_KEY is configured");
        }

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert messages to Gemini `contents`.
    ///
    /// Gemini calls the assistant "model" and expects turns to alternate,
    /// so consecutive messages from the same role are folded into one turn
    /// with several parts.
    fn to_gemini_contents(messages: &[ChatMessage]) -> Vec<GeminiContent> {
        let mut contents: Vec<GeminiContent> = Vec::with_capacity(messages.len());

        for msg in messages {
            let role = match msg.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            let part = GeminiPart {
                text: Some(msg.content.clone()),
            };
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
                _ => contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![part],
                }),
            }
        }

        contents
    }

    /// Text of the first candidate, all parts concatenated
    fn candidate_text(resp: GeminiApiResponse) -> Option<String> {
        let content = resp.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }

    fn from_gemini_response(resp: GeminiApiResponse) -> Result<String, ProviderError> {
        if resp.candidates.is_empty() {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                format!("Gemini response had no candidates ({reason})"),
            ));
        }
        match Self::candidate_text(resp) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                "Gemini response had no text",
            )),
        }
    }

    fn parse_stream_chunk(data: &str) -> Result<SseChunk, ProviderError> {
        let chunk: GeminiApiResponse = serde_json::from_str(data).map_err(|e| {
            ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                format!("Failed to parse Gemini stream chunk: {e}"),
            )
        })?;
        Ok(match Self::candidate_text(chunk) {
            Some(text) if !text.is_empty() => SseChunk::Text(text),
            _ => SseChunk::Skip,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
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
                "GEMINI_API_KEY is not configured",
            ));
        }

        let streaming = sink.is_some();
        let url = if streaming {
            format!("{}/models/{}:streamGenerateContent", self.base_url, model)
        } else {
            format!("{}/models/{}:generateContent", self.base_url, model)
        };

        let body = GeminiRequest {
            contents: Self::to_gemini_contents(messages),
        };

        debug!(
            "Gemini request: model={}, contents={}, stream={}",
            model,
            body.contents.len(),
            streaming
        );

        let mut request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key);
        if streaming {
            request = request.query(&[("alt", "sse")]);
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

        let api_response: GeminiApiResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER_NAME,
                ErrorKind::Other,
                format!("Failed to parse Gemini API response: {e}"),
            )
        })?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        Self::from_gemini_response(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("AIza-secret".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_to_gemini_contents_renames_assistant() {
        let msgs = vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("how are you?"),
        ];
        let result = GeminiProvider::to_gemini_contents(&msgs);
        let roles: Vec<_> = result.iter().map(|c| c.role.as_deref().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_to_gemini_contents_merges_consecutive_turns() {
        let msgs = vec![
            ChatMessage::user("first"),
            ChatMessage::user("second"),
            ChatMessage::assistant("reply"),
            ChatMessage::assistant("more"),
            ChatMessage::user("third"),
        ];
        let result = GeminiProvider::to_gemini_contents(&msgs);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].parts.len(), 2);
        assert_eq!(result[0].parts[1].text.as_deref(), Some("second"));
        assert_eq!(result[1].role.as_deref(), Some("model"));
        assert_eq!(result[1].parts.len(), 2);
    }

    #[test]
    fn test_request_wire_shape() {
        let body = GeminiRequest {
            contents: GeminiProvider::to_gemini_contents(&[ChatMessage::user("Salam")]),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"contents": [{"role": "user", "parts": [{"text": "Salam"}]}]})
        );
    }

    #[test]
    fn test_from_gemini_response_text() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " world"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(GeminiProvider::from_gemini_response(resp).unwrap(), "Hello world");
    }

    #[test]
    fn test_from_gemini_response_no_candidates() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = GeminiProvider::from_gemini_response(resp).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(err.message.contains("SAFETY"));
    }

    #[test]
    fn test_from_gemini_response_missing_content() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(GeminiProvider::from_gemini_response(resp).is_err());
    }

    #[test]
    fn test_parse_stream_chunk() {
        let chunk = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]}}]}"#;
        assert!(matches!(
            GeminiProvider::parse_stream_chunk(chunk).unwrap(),
            SseChunk::Text(t) if t == "Hi"
        ));
        let empty = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        assert!(matches!(
            GeminiProvider::parse_stream_chunk(empty).unwrap(),
            SseChunk::Skip
        ));
        assert!(GeminiProvider::parse_stream_chunk("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let p = GeminiProvider::new(String::new(), Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = p
            .chat("gemini-pro", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_connect_error_does_not_leak_key() {
        let p = provider().with_base_url("http://127.0.0.1:9");
        let err = p
            .chat("gemini-pro", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(!err.message.contains("AIza-secret"));
        assert!(!err.to_string().contains("AIza-secret"));
        assert!(!err.message.contains("127.0.0.1"));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", provider());
        assert!(!debug.contains("AIza-secret"));
        assert!(debug.contains("has_api_key: true"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let p = provider().with_base_url("http://localhost:1234/v1beta/");
        assert_eq!(p.base_url, "http://localhost:1234/v1beta");
    }
}
