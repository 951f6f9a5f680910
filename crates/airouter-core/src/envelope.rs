//! Response envelopes: the tagged result of one routed request

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classifier::Category;
use crate::error::ProviderError;
use crate::providers::InvocationResult;

/// User-facing message when even the fallback model failed
pub const ALL_MODELS_FAILED: &str = "All models failed. Please try again later.";

/// One side of a dual response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DualOutcome {
    Ok { text: String },
    Error { error: String },
}

impl DualOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Text, or the error rendered as `Error: <message>`
    pub fn display_text(&self) -> String {
        match self {
            Self::Ok { text } => text.clone(),
            Self::Error { error } => format!("Error: {error}"),
        }
    }
}

/// The only value the router returns for a handled request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// One provider answered
    Single {
        provider: String,
        model: String,
        category: Category,
        response: String,
    },
    /// Two providers were asked side by side; each entry is text or error
    Dual {
        responses: BTreeMap<String, DualOutcome>,
    },
    /// The primary route failed and the fallback model answered
    Fallback {
        provider: String,
        model: String,
        response: String,
    },
    /// Every attempt failed
    Error { message: String, error: String },
}

impl ResponseEnvelope {
    /// `single:<provider>`, `dual`, `fallback` or `error`
    pub fn route_tag(&self) -> String {
        match self {
            Self::Single { provider, .. } => format!("single:{provider}"),
            Self::Dual { .. } => "dual".to_string(),
            Self::Fallback { .. } => "fallback".to_string(),
            Self::Error { .. } => "error".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// A single human-readable rendering of the envelope
    pub fn text(&self) -> String {
        match self {
            Self::Single { response, .. } | Self::Fallback { response, .. } => response.clone(),
            Self::Dual { responses } => responses
                .iter()
                .map(|(provider, outcome)| format!("{provider}: {}", outcome.display_text()))
                .collect::<Vec<_>>()
                .join("\n\n"),
            Self::Error { message, .. } => message.clone(),
        }
    }
}

pub fn single(provider: &str, model: &str, category: Category, response: String) -> ResponseEnvelope {
    ResponseEnvelope::Single {
        provider: provider.to_string(),
        model: model.to_string(),
        category,
        response,
    }
}

/// Merge settled results; a failure becomes an error entry, never a drop
pub fn dual(results: impl IntoIterator<Item = InvocationResult>) -> ResponseEnvelope {
    let responses = results
        .into_iter()
        .map(|r| {
            let outcome = match r.outcome {
                Ok(text) => DualOutcome::Ok { text },
                Err(e) => DualOutcome::Error { error: e.message },
            };
            (r.provider, outcome)
        })
        .collect();
    ResponseEnvelope::Dual { responses }
}

pub fn fallback(provider: &str, model: &str, response: String) -> ResponseEnvelope {
    ResponseEnvelope::Fallback {
        provider: provider.to_string(),
        model: model.to_string(),
        response,
    }
}

pub fn terminal(error: &ProviderError) -> ResponseEnvelope {
    ResponseEnvelope::Error {
        message: ALL_MODELS_FAILED.to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn settled(provider: &str, outcome: Result<&str, &str>) -> InvocationResult {
        InvocationResult {
            provider: provider.to_string(),
            model: "m".to_string(),
            outcome: outcome
                .map(str::to_string)
                .map_err(|e| ProviderError::new(provider, ErrorKind::Other, e)),
        }
    }

    #[test]
    fn test_route_tags() {
        assert_eq!(
            single("gemini", "gemini-pro", Category::General, "hi".into()).route_tag(),
            "single:gemini"
        );
        assert_eq!(dual(vec![]).route_tag(), "dual");
        assert_eq!(fallback("openrouter", "m", "x".into()).route_tag(), "fallback");
        let err = ProviderError::new("openrouter", ErrorKind::Network, "down");
        assert_eq!(terminal(&err).route_tag(), "error");
    }

    #[test]
    fn test_dual_keeps_both_keys_on_partial_failure() {
        let envelope = dual(vec![
            settled("openrouter", Err("API error: 500")),
            settled("gemini", Ok("E = mc^2")),
        ]);
        let ResponseEnvelope::Dual { responses } = &envelope else {
            panic!("expected dual");
        };
        assert_eq!(responses.len(), 2);
        assert!(responses["gemini"].is_ok());
        assert_eq!(
            responses["openrouter"].display_text(),
            "Error: API error: 500"
        );
        assert_eq!(
            envelope.text(),
            "gemini: E = mc^2\n\nopenrouter: Error: API error: 500"
        );
    }

    #[test]
    fn test_terminal_carries_diagnostic() {
        let err = ProviderError::from_status("openrouter", 401, "bad key");
        let envelope = terminal(&err);
        assert!(envelope.is_error());
        assert_eq!(envelope.text(), ALL_MODELS_FAILED);
        match envelope {
            ResponseEnvelope::Error { error, .. } => assert!(error.contains("401")),
            _ => panic!("expected error envelope"),
        }
    }

    #[test]
    fn test_serialized_shapes_are_distinct() {
        let single = serde_json::to_value(single(
            "gemini",
            "gemini-pro",
            Category::RegionalLanguage,
            "Salam!".into(),
        ))
        .unwrap();
        assert_eq!(single["route"], "single");
        assert_eq!(single["category"], "regional-language");
        assert_eq!(single["response"], "Salam!");

        let dual = serde_json::to_value(dual(vec![settled("gemini", Ok("a"))])).unwrap();
        assert_eq!(dual["route"], "dual");
        assert_eq!(dual["responses"]["gemini"]["status"], "ok");
        assert_eq!(dual["responses"]["gemini"]["text"], "a");

        let err = ProviderError::new("openrouter", ErrorKind::Other, "boom");
        let terminal = serde_json::to_value(terminal(&err)).unwrap();
        assert_eq!(terminal["route"], "error");
        assert_eq!(terminal["message"], ALL_MODELS_FAILED);
    }
}
