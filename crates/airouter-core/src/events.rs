//! Route events: the trace hook the router and adapters report into
//!
//! The core never logs routing decisions directly. It emits [`RouteEvent`]s
//! to a [`RouteObserver`]; [`TracingObserver`] forwards them to `tracing`
//! and [`EventBus`] fans them out to any number of subscribers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::Category;
use crate::error::ErrorKind;

/// Something that happened while routing one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RouteEvent {
    /// The last message was classified
    Classified { category: Category },
    /// A dispatch path was chosen (`single:<provider>`, `dual`, `fallback`)
    RouteSelected { route: String },
    /// One provider attempt failed
    AttemptFailed {
        provider: String,
        model: String,
        attempt: u32,
        max_attempts: u32,
        kind: ErrorKind,
        message: String,
    },
    /// One provider attempt succeeded
    AttemptSucceeded {
        provider: String,
        model: String,
        attempt: u32,
    },
    /// The adapter is sleeping before the next attempt
    Backoff {
        provider: String,
        #[serde(with = "millis")]
        delay: Duration,
    },
    /// The primary route failed and the fallback model is being tried
    FallbackTriggered { reason: String },
    /// The request finished with an envelope carrying this route tag
    Completed { route_tag: String },
}

/// Receives route events. Implementations must be cheap and non-blocking.
pub trait RouteObserver: Send + Sync {
    fn on_event(&self, request_id: Uuid, event: &RouteEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RouteObserver for TracingObserver {
    fn on_event(&self, request_id: Uuid, event: &RouteEvent) {
        match event {
            RouteEvent::Classified { category } => {
                debug!(%request_id, %category, "Classified request");
            }
            RouteEvent::RouteSelected { route } => {
                info!(%request_id, %route, "Routing request");
            }
            RouteEvent::AttemptFailed {
                provider,
                model,
                attempt,
                max_attempts,
                kind,
                message,
            } => {
                warn!(
                    %request_id,
                    "{} ({}) attempt {}/{} failed [{}]: {}",
                    provider, model, attempt, max_attempts, kind, message
                );
            }
            RouteEvent::AttemptSucceeded {
                provider,
                model,
                attempt,
            } => {
                debug!(%request_id, "{} ({}) succeeded on attempt {}", provider, model, attempt);
            }
            RouteEvent::Backoff { provider, delay } => {
                debug!(%request_id, "Backing off {:?} before retrying {}", delay, provider);
            }
            RouteEvent::FallbackTriggered { reason } => {
                warn!(%request_id, "All attempts failed, trying fallback model: {}", reason);
            }
            RouteEvent::Completed { route_tag } => {
                info!(%request_id, %route_tag, "Request completed");
            }
        }
    }
}

/// A route event stamped with the request it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct RouteEventRecord {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub event: RouteEvent,
}

/// Broadcast bus for route events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<RouteEventRecord>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouteEventRecord> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl RouteObserver for EventBus {
    fn on_event(&self, request_id: Uuid, event: &RouteEvent) {
        if self.sender.receiver_count() > 0 {
            // No receivers is fine
            let _ = self.sender.send(RouteEventRecord {
                request_id,
                event: event.clone(),
            });
        }
    }
}

/// Sends every event to each inner observer in order
pub struct Fanout(pub Vec<Arc<dyn RouteObserver>>);

impl RouteObserver for Fanout {
    fn on_event(&self, request_id: Uuid, event: &RouteEvent) {
        for observer in &self.0 {
            observer.on_event(request_id, event);
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
