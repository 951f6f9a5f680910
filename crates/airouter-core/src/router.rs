//! Request router with dual dispatch and fallback
//!
//! Classifies the last message, sends the conversation to the provider
//! that category maps to, and falls back to a dedicated model on the
//! specialist provider when the chosen single-provider route fails.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::classifier::{Category, classify};
use crate::envelope::{self, ResponseEnvelope};
use crate::error::RouterError;
use crate::events::{RouteEvent, RouteObserver, TracingObserver};
use crate::providers::{InvocationResult, ModelSlot, ProviderAdapter, RequestContext};
use crate::stream::TokenSink;
use crate::types::{Conversation, RouteInput};

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 6000;

/// Router limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Maximum characters across all messages, checked before any network call
    pub max_prompt_chars: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }
}

/// Per-call options
#[derive(Default, Clone)]
pub struct RouteOptions {
    /// Receives tokens as they arrive
    pub sink: Option<Arc<dyn TokenSink>>,
    /// Aborts in-flight calls and pending backoffs when cancelled
    pub cancel: Option<CancellationToken>,
}

/// Routes requests across a general-purpose and a specialist provider
pub struct Router {
    /// Provider A: regional-language and general requests
    primary: ProviderAdapter,
    /// Provider B: coding, science and fallback models
    specialist: ProviderAdapter,
    config: RouterConfig,
    observer: Arc<dyn RouteObserver>,
}

impl Router {
    pub fn new(primary: ProviderAdapter, specialist: ProviderAdapter) -> Self {
        Self {
            primary,
            specialist,
            config: RouterConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RouteObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route one request with default options
    pub async fn route(
        &self,
        input: impl Into<RouteInput>,
    ) -> Result<ResponseEnvelope, RouterError> {
        self.route_with(input, RouteOptions::default()).await
    }

    /// Route one request.
    ///
    /// Only invalid input, an over-limit prompt or cancellation produce an
    /// `Err`. Provider failures end up inside the returned envelope.
    pub async fn route_with(
        &self,
        input: impl Into<RouteInput>,
        options: RouteOptions,
    ) -> Result<ResponseEnvelope, RouterError> {
        let conversation = Conversation::try_from(input.into())?;

        let length = conversation.char_count();
        if length > self.config.max_prompt_chars {
            return Err(RouterError::PromptTooLong {
                length,
                limit: self.config.max_prompt_chars,
            });
        }

        let mut ctx = RequestContext::new(self.observer.clone());
        ctx.sink = options.sink;
        if let Some(cancel) = options.cancel {
            ctx.cancel = cancel;
        }

        let category = classify(conversation.last_text());
        ctx.emit(RouteEvent::Classified { category });

        let envelope = self.dispatch(&ctx, &conversation, category).await?;
        ctx.emit(RouteEvent::Completed {
            route_tag: envelope.route_tag(),
        });
        Ok(envelope)
    }

    /// Pick the path for a category and apply the fallback policy
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        conversation: &Conversation,
        category: Category,
    ) -> Result<ResponseEnvelope, RouterError> {
        let adapter = match category {
            Category::ScienceDual => return self.dispatch_dual(ctx, conversation).await,
            Category::RegionalLanguage | Category::General => &self.primary,
            Category::Coding => &self.specialist,
        };

        let slot = ModelSlot::for_category(category);
        ctx.emit(RouteEvent::RouteSelected {
            route: format!("single:{}", adapter.name()),
        });

        let err = match adapter.invoke(ctx, conversation, slot).await {
            Ok(text) => {
                return Ok(envelope::single(
                    adapter.name(),
                    adapter.model(slot),
                    category,
                    text,
                ));
            }
            Err(e) if e.is_cancelled() => return Err(RouterError::Cancelled),
            Err(e) => e,
        };

        ctx.emit(RouteEvent::FallbackTriggered {
            reason: err.to_string(),
        });
        ctx.emit(RouteEvent::RouteSelected {
            route: "fallback".to_string(),
        });

        let fallback = &self.specialist;
        match fallback.invoke(ctx, conversation, ModelSlot::Fallback).await {
            Ok(text) => Ok(envelope::fallback(
                fallback.name(),
                fallback.model(ModelSlot::Fallback),
                text,
            )),
            Err(e) if e.is_cancelled() => Err(RouterError::Cancelled),
            Err(e) => Ok(envelope::terminal(&e)),
        }
    }

    /// Ask both providers at once and wait for both to settle.
    ///
    /// Provider failures never fail the request: each side contributes text
    /// or an error message. Only cancellation is an `Err`.
    async fn dispatch_dual(
        &self,
        ctx: &RequestContext,
        conversation: &Conversation,
    ) -> Result<ResponseEnvelope, RouterError> {
        ctx.emit(RouteEvent::RouteSelected {
            route: "dual".to_string(),
        });

        let (specialist, primary) = tokio::join!(
            self.specialist
                .invoke_settled(ctx, conversation, ModelSlot::Science),
            self.primary
                .invoke_settled(ctx, conversation, ModelSlot::General),
        );

        let cancelled = |r: &InvocationResult| matches!(&r.outcome, Err(e) if e.is_cancelled());
        if ctx.cancel.is_cancelled() || cancelled(&specialist) || cancelled(&primary) {
            return Err(RouterError::Cancelled);
        }

        Ok(envelope::dual([specialist, primary]))
    }
}
