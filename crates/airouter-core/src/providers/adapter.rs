//! Retrying adapter around one backend
//!
//! A [`ProviderAdapter`] turns a single-shot [`LlmProvider`] into the
//! uniform `invoke(conversation) -> text` contract the router relies on:
//! bounded retries with linear backoff, model selection by slot, and
//! route events for every attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::events::{RouteEvent, RouteObserver, TracingObserver};
use crate::stream::TokenSink;
use crate::types::Conversation;

use super::types::{LlmProvider, ModelSlot, ModelTable};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Delay grows by a fixed step per attempt: base, 2×base, 3×base, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub base: Duration,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}

/// Static description of one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    /// Total attempts per invocation, including the first
    pub max_retries: u32,
    pub backoff: LinearBackoff,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: LinearBackoff::default(),
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Per-request state shared by every adapter call of one route
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub observer: Arc<dyn RouteObserver>,
    pub sink: Option<Arc<dyn TokenSink>>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(observer: Arc<dyn RouteObserver>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            observer,
            sink: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn emit(&self, event: RouteEvent) {
        self.observer.on_event(self.request_id, &event);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

/// Settled outcome of one adapter invocation
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub provider: String,
    pub model: String,
    pub outcome: Result<String, ProviderError>,
}

/// A backend plus its retry policy and model table
#[derive(Clone)]
pub struct ProviderAdapter {
    spec: ProviderSpec,
    backend: Arc<dyn LlmProvider>,
    models: ModelTable,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("spec", &self.spec)
            .field("models", &self.models)
            .finish()
    }
}

impl ProviderAdapter {
    pub fn new(backend: Arc<dyn LlmProvider>, models: ModelTable) -> Self {
        Self {
            spec: ProviderSpec::new(backend.provider_name()),
            backend,
            models,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.spec.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.spec.backoff = LinearBackoff::new(base);
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    pub fn model(&self, slot: ModelSlot) -> &str {
        self.models.get(slot)
    }

    /// Call the backend until it succeeds or attempts run out.
    ///
    /// The error kind is reported but does not change retry behavior. The
    /// last error propagates once every attempt failed. Cancellation aborts
    /// both an in-flight call and a pending backoff.
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        conversation: &Conversation,
        slot: ModelSlot,
    ) -> Result<String, ProviderError> {
        let model = self.models.get(slot);
        let max_attempts = self.spec.max_attempts();
        let mut attempt = 1;

        loop {
            if let Some(sink) = &ctx.sink {
                sink.on_attempt(&self.spec.name, attempt);
            }

            let call = self
                .backend
                .chat(model, conversation.messages(), ctx.sink.as_deref());
            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(ProviderError::cancelled(&self.spec.name)),
                result = call => result,
            };

            let err = match result {
                Ok(text) => {
                    ctx.emit(RouteEvent::AttemptSucceeded {
                        provider: self.spec.name.clone(),
                        model: model.to_string(),
                        attempt,
                    });
                    return Ok(text);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            ctx.emit(RouteEvent::AttemptFailed {
                provider: self.spec.name.clone(),
                model: model.to_string(),
                attempt,
                max_attempts,
                kind: err.kind,
                message: err.message.clone(),
            });

            if attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.spec.backoff.delay(attempt);
            ctx.emit(RouteEvent::Backoff {
                provider: self.spec.name.clone(),
                delay,
            });
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(ProviderError::cancelled(&self.spec.name)),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Like [`invoke`](Self::invoke) but never fails: the outcome is captured
    pub async fn invoke_settled(
        &self,
        ctx: &RequestContext,
        conversation: &Conversation,
        slot: ModelSlot,
    ) -> InvocationResult {
        let outcome = self.invoke(ctx, conversation, slot).await;
        InvocationResult {
            provider: self.spec.name.clone(),
            model: self.models.get(slot).to_string(),
            outcome,
        }
    }
}
