//! LLM provider layer
//!
//! Backends implement the single-shot [`LlmProvider`] trait. A
//! [`ProviderAdapter`] wraps one backend with the retry policy and model
//! table the router dispatches through.

pub mod adapter;
pub mod google;
pub mod openrouter;
mod sse;
pub mod types;

pub use adapter::{InvocationResult, LinearBackoff, ProviderAdapter, ProviderSpec, RequestContext};
pub use google::GeminiProvider;
pub use openrouter::OpenRouterProvider;
pub use types::{LlmProvider, ModelSlot, ModelTable};
