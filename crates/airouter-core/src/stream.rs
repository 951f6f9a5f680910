//! Incremental token output
//!
//! A [`TokenSink`] receives text deltas while a provider is still
//! generating. The router always returns the full accumulated text as well,
//! so streaming is purely a presentation concern.

use std::io::Write;
use std::sync::Mutex;

/// Receives incremental output from a streaming provider call
pub trait TokenSink: Send + Sync {
    /// Called once per text delta, in arrival order
    fn on_token(&self, provider: &str, token: &str);

    /// Called when a provider attempt begins, so a sink can discard output
    /// from an earlier failed attempt
    fn on_attempt(&self, _provider: &str, _attempt: u32) {}
}

/// Writes tokens straight to stdout, flushing after each one.
///
/// Output is prefixed with `[provider]` whenever the provider changes, so
/// concurrent streams stay attributable.
#[derive(Debug, Default)]
pub struct StdoutSink {
    last_provider: Mutex<Option<String>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label to print before a token, if the provider changed
    fn label(&self, provider: &str) -> Option<String> {
        let mut last = self.last_provider.lock().ok()?;
        if last.as_deref() == Some(provider) {
            return None;
        }
        let label = if last.is_some() {
            format!("\n[{provider}] ")
        } else {
            format!("[{provider}] ")
        };
        *last = Some(provider.to_string());
        Some(label)
    }
}

impl TokenSink for StdoutSink {
    fn on_token(&self, provider: &str, token: &str) {
        let label = self.label(provider);
        let mut out = std::io::stdout().lock();
        if let Some(label) = label {
            let _ = out.write_all(label.as_bytes());
        }
        let _ = out.write_all(token.as_bytes());
        let _ = out.flush();
    }
}

/// Collects tokens in memory, keyed by provider
#[derive(Debug, Default)]
pub struct BufferSink {
    tokens: Mutex<Vec<(String, String)>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated output received from one provider
    pub fn text_for(&self, provider: &str) -> String {
        self.tokens
            .lock()
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|(p, _)| p == provider)
                    .map(|(_, t)| t.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl TokenSink for BufferSink {
    fn on_token(&self, provider: &str, token: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push((provider.to_string(), token.to_string()));
        }
    }

    fn on_attempt(&self, provider: &str, _attempt: u32) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.retain(|(p, _)| p != provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_groups_by_provider() {
        let sink = BufferSink::new();
        sink.on_token("gemini", "Hel");
        sink.on_token("openrouter", "Bon");
        sink.on_token("gemini", "lo");
        assert_eq!(sink.text_for("gemini"), "Hello");
        assert_eq!(sink.text_for("openrouter"), "Bon");
        assert_eq!(sink.token_count(), 3);
    }

    #[test]
    fn test_stdout_sink_labels_provider_changes() {
        let sink = StdoutSink::new();
        assert_eq!(sink.label("gemini").as_deref(), Some("[gemini] "));
        assert_eq!(sink.label("gemini"), None);
        assert_eq!(sink.label("openrouter").as_deref(), Some("\n[openrouter] "));
        assert_eq!(sink.label("openrouter"), None);
        assert_eq!(sink.label("gemini").as_deref(), Some("\n[gemini] "));
    }

    #[test]
    fn test_new_attempt_discards_partial_output() {
        let sink = BufferSink::new();
        sink.on_attempt("gemini", 1);
        sink.on_token("gemini", "partial");
        sink.on_token("openrouter", "kept");
        sink.on_attempt("gemini", 2);
        sink.on_token("gemini", "full");
        assert_eq!(sink.text_for("gemini"), "full");
        assert_eq!(sink.text_for("openrouter"), "kept");
    }
}
