//! Shared server-sent-events reader for streaming backends

use eventsource_stream::Eventsource;
use futures_util::StreamExt;

use crate::error::{ErrorKind, ProviderError};
use crate::stream::TokenSink;

/// What one SSE `data:` payload contributed
#[derive(Debug)]
pub(crate) enum SseChunk {
    Text(String),
    Skip,
    Done,
}

/// Drain an SSE response, forwarding each text delta to `sink` and
/// returning the accumulated text.
pub(crate) async fn collect_sse<F>(
    provider: &str,
    response: reqwest::Response,
    sink: Option<&dyn TokenSink>,
    mut parse: F,
) -> Result<String, ProviderError>
where
    F: FnMut(&str) -> Result<SseChunk, ProviderError> + Send,
{
    let mut events = response.bytes_stream().eventsource();
    let mut text = String::new();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| {
            ProviderError::new(provider, ErrorKind::Network, format!("stream error: {e}"))
        })?;
        let data = event.data.trim();
        if data.is_empty() {
            continue;
        }
        match parse(data)? {
            SseChunk::Text(delta) => {
                if let Some(sink) = sink {
                    sink.on_token(provider, &delta);
                }
                text.push_str(&delta);
            }
            SseChunk::Skip => {}
            SseChunk::Done => break,
        }
    }

    if text.is_empty() {
        return Err(ProviderError::new(
            provider,
            ErrorKind::Other,
            "stream ended without any text",
        ));
    }
    Ok(text)
}
