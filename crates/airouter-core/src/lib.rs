//! airouter-core - Multi-provider LLM request router
//!
//! This crate provides:
//! - Keyword classifier that maps a prompt to a routing category
//! - Gemini and OpenRouter backends with optional SSE streaming
//! - Retrying provider adapters with linear backoff
//! - Router with single, dual and fallback paths producing a tagged envelope
//! - Route events for tracing or broadcast to subscribers

pub mod classifier;
pub mod envelope;
pub mod error;
pub mod events;
pub mod providers;
pub mod router;
pub mod stream;
pub mod types;

// Re-export main types for convenience
pub use classifier::{Category, classify};
pub use envelope::{DualOutcome, ResponseEnvelope};
pub use error::{ErrorKind, ProviderError, RouterError};
pub use events::{EventBus, RouteEvent, RouteObserver, TracingObserver};
pub use providers::{
    GeminiProvider, LlmProvider, ModelSlot, ModelTable, OpenRouterProvider, ProviderAdapter,
};
pub use router::{RouteOptions, Router, RouterConfig};
pub use stream::{BufferSink, StdoutSink, TokenSink};
pub use types::{ChatMessage, ChatRole, Conversation, RouteInput};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Router>();
        let _ = std::mem::size_of::<ResponseEnvelope>();
        let _ = std::mem::size_of::<ProviderAdapter>();
        let _ = std::mem::size_of::<Conversation>();
        assert_eq!(classify("hello"), Category::General);
    }
}
