//! Backend trait and per-provider model tables

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classifier::Category;
use crate::error::ProviderError;
use crate::stream::TokenSink;
use crate::types::ChatMessage;

/// One network call to one LLM API. No retries at this level.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini", "openrouter")
    fn provider_name(&self) -> &str;

    /// Send the conversation to `model` and return the reply text.
    ///
    /// When `sink` is set the backend streams and reports each delta to it
    /// before returning the accumulated text.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sink: Option<&dyn TokenSink>,
    ) -> Result<String, ProviderError>;
}

/// Which model of a provider's table a call should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSlot {
    General,
    Coding,
    Science,
    Fallback,
}

impl ModelSlot {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::RegionalLanguage | Category::General => Self::General,
            Category::Coding => Self::Coding,
            Category::ScienceDual => Self::Science,
        }
    }
}

impl std::fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Coding => write!(f, "coding"),
            Self::Science => write!(f, "science"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Model identifiers a provider uses for each slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTable {
    pub general: String,
    pub coding: String,
    pub science: String,
    pub fallback: String,
}

impl ModelTable {
    /// Same model for every slot
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            general: model.clone(),
            coding: model.clone(),
            science: model.clone(),
            fallback: model,
        }
    }

    pub fn gemini_defaults() -> Self {
        Self::uniform("gemini-pro")
    }

    pub fn openrouter_defaults() -> Self {
        Self {
            general: "google/gemma-2-9b-it:free".to_string(),
            coding: "deepseek/deepseek-coder".to_string(),
            science: "meta-llama/llama-3.1-8b-instruct:free".to_string(),
            fallback: "mistralai/mistral-7b-instruct:free".to_string(),
        }
    }

    pub fn get(&self, slot: ModelSlot) -> &str {
        match slot {
            ModelSlot::General => &self.general,
            ModelSlot::Coding => &self.coding,
            ModelSlot::Science => &self.science,
            ModelSlot::Fallback => &self.fallback,
        }
    }
}
