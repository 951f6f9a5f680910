use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use airouter_core::providers::{google, openrouter};
use airouter_core::{
    GeminiProvider, ModelTable, OpenRouterProvider, ProviderAdapter, Router, RouterConfig,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Per-attempt HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_prompt_chars() -> usize {
    airouter_core::router::DEFAULT_MAX_PROMPT_CHARS
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_gemini_config")]
    pub gemini: GeminiConfig,
    #[serde(default = "default_openrouter_config")]
    pub openrouter: OpenRouterConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini: default_gemini_config(),
            openrouter: default_openrouter_config(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "ModelTable::gemini_defaults")]
    pub models: ModelTable,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("models", &self.models)
            .finish()
    }
}

fn default_gemini_config() -> GeminiConfig {
    GeminiConfig {
        api_key: String::new(),
        base_url: default_gemini_base_url(),
        max_retries: default_max_retries(),
        backoff_base_ms: default_backoff_base_ms(),
        models: ModelTable::gemini_defaults(),
    }
}

fn default_gemini_base_url() -> String {
    google::DEFAULT_BASE_URL.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Sent as `HTTP-Referer`
    #[serde(default)]
    pub referer: String,
    /// Sent as `X-Title`
    #[serde(default)]
    pub title: String,
    #[serde(default = "ModelTable::openrouter_defaults")]
    pub models: ModelTable,
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("models", &self.models)
            .finish()
    }
}

fn default_openrouter_config() -> OpenRouterConfig {
    OpenRouterConfig {
        api_key: String::new(),
        base_url: default_openrouter_base_url(),
        max_retries: default_max_retries(),
        backoff_base_ms: default_backoff_base_ms(),
        referer: String::new(),
        title: String::new(),
        models: ModelTable::openrouter_defaults(),
    }
}

fn default_openrouter_base_url() -> String {
    openrouter::DEFAULT_BASE_URL.to_string()
}

fn default_max_retries() -> u32 {
    airouter_core::providers::adapter::DEFAULT_MAX_RETRIES
}

fn default_backoff_base_ms() -> u64 {
    airouter_core::providers::adapter::DEFAULT_BACKOFF_BASE.as_millis() as u64
}

impl AppConfig {
    /// Load from `custom_path` or `~/.airouter/config.toml`.
    ///
    /// A missing default file means built-in defaults; a missing explicit
    /// path is an error. Environment fills happen after parsing.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else if custom_path.is_some() {
            anyhow::bail!("Config file not found at {}", path.display());
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content, |name| std::env::var(name).ok());

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if config.providers.openrouter.api_key.starts_with("sk-or-") {
            warn!(
                "OpenRouter API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPEN_ROUTER_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Fill unset values from the environment
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if self.providers.gemini.api_key.is_empty() {
            if let Some(key) = lookup("GEMINI_API_KEY") {
                self.providers.gemini.api_key = key;
            }
        }

        let openrouter = &mut self.providers.openrouter;
        if openrouter.api_key.is_empty() {
            if let Some(key) = lookup("OPEN_ROUTER_API_KEY") {
                openrouter.api_key = key;
            }
        }
        if openrouter.referer.is_empty() {
            if let Some(referer) = lookup("OPENROUTER_REFERER") {
                openrouter.referer = referer;
            }
        }
        if openrouter.title.is_empty() {
            if let Some(title) = lookup("OPENROUTER_TITLE") {
                openrouter.title = title;
            }
        }

        if let Some(limit) = lookup("MAX_PROMPT_LENGTH") {
            match limit.trim().parse() {
                Ok(limit) => self.router.max_prompt_chars = limit,
                Err(_) => warn!("Ignoring invalid MAX_PROMPT_LENGTH '{}'", limit),
            }
        }
    }

    /// Build the router both providers feed into. Each provider warns once
    /// here if its key is missing.
    pub fn build_router(&self) -> Result<Router> {
        let timeout = Duration::from_secs(self.router.request_timeout_secs);

        let gemini_cfg = &self.providers.gemini;
        let gemini = GeminiProvider::new(gemini_cfg.api_key.clone(), timeout)
            .context("Failed to build Gemini HTTP client")?
            .with_base_url(&gemini_cfg.base_url);
        let primary = ProviderAdapter::new(Arc::new(gemini), gemini_cfg.models.clone())
            .with_max_retries(gemini_cfg.max_retries)
            .with_backoff_base(Duration::from_millis(gemini_cfg.backoff_base_ms));

        let or_cfg = &self.providers.openrouter;
        let openrouter = OpenRouterProvider::new(or_cfg.api_key.clone(), timeout)
            .context("Failed to build OpenRouter HTTP client")?
            .with_base_url(&or_cfg.base_url)
            .with_identification(Some(or_cfg.referer.clone()), Some(or_cfg.title.clone()));
        let specialist = ProviderAdapter::new(Arc::new(openrouter), or_cfg.models.clone())
            .with_max_retries(or_cfg.max_retries)
            .with_backoff_base(Duration::from_millis(or_cfg.backoff_base_ms));

        Ok(Router::new(primary, specialist).with_config(RouterConfig {
            max_prompt_chars: self.router.max_prompt_chars,
        }))
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".airouter")
}

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "GEMINI_API_KEY",
    "OPEN_ROUTER_API_KEY",
    "OPENROUTER_REFERER",
    "OPENROUTER_TITLE",
    "MAX_PROMPT_LENGTH",
];

fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    /// Log output captured from a scoped subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish();
            tracing::subscriber::with_default(subscriber, f)
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.router.max_prompt_chars, 6000);
        assert_eq!(cfg.router.request_timeout_secs, 120);
        assert_eq!(cfg.providers.gemini.max_retries, 3);
        assert_eq!(cfg.providers.gemini.backoff_base_ms, 1000);
        assert_eq!(cfg.providers.openrouter.models.fallback, "mistralai/mistral-7b-instruct:free");
        assert_eq!(cfg.providers.gemini.models.general, "gemini-pro");
    }

    #[test]
    fn test_expand_allowlisted_only() {
        let lookup = env(&[("GEMINI_API_KEY", "g-key"), ("HOME", "/root")]);
        let out = expand_env_vars("a = \"${GEMINI_API_KEY}\"\nb = \"${HOME}\"", lookup);
        assert_eq!(out, "a = \"g-key\"\nb = \"${HOME}\"");
    }

    #[test]
    fn test_expand_unset_is_empty() {
        let out = expand_env_vars("key = \"${OPEN_ROUTER_API_KEY}\"", env(&[]));
        assert_eq!(out, "key = \"\"");
    }

    #[test]
    fn test_expand_unterminated_left_alone() {
        let out = expand_env_vars("key = \"${GEMINI_API_KEY\"", env(&[]));
        assert_eq!(out, "key = \"${GEMINI_API_KEY\"");
    }

    #[test]
    fn test_apply_env_fills_empty_values() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[
            ("GEMINI_API_KEY", "g-key"),
            ("OPEN_ROUTER_API_KEY", "or-key"),
            ("OPENROUTER_REFERER", "https://example.test"),
            ("OPENROUTER_TITLE", "AI Router"),
            ("MAX_PROMPT_LENGTH", "8000"),
        ]));
        assert_eq!(cfg.providers.gemini.api_key, "g-key");
        assert_eq!(cfg.providers.openrouter.api_key, "or-key");
        assert_eq!(cfg.providers.openrouter.referer, "https://example.test");
        assert_eq!(cfg.providers.openrouter.title, "AI Router");
        assert_eq!(cfg.router.max_prompt_chars, 8000);
    }

    #[test]
    fn test_apply_env_keeps_configured_keys() {
        let mut cfg = AppConfig::default();
        cfg.providers.gemini.api_key = "from-file".to_string();
        cfg.apply_env(env(&[("GEMINI_API_KEY", "from-env")]));
        assert_eq!(cfg.providers.gemini.api_key, "from-file");
    }

    #[test]
    fn test_apply_env_ignores_bad_limit() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[("MAX_PROMPT_LENGTH", "lots")]));
        assert_eq!(cfg.router.max_prompt_chars, 6000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[router]
max_prompt_chars = 100

[providers.openrouter]
api_key = "abc"
title = "AI Router"

[providers.openrouter.models]
general = "g"
coding = "c"
science = "s"
fallback = "f"
"#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.router.max_prompt_chars, 100);
        assert_eq!(cfg.router.request_timeout_secs, 120);
        assert_eq!(cfg.providers.openrouter.models.coding, "c");
        assert_eq!(cfg.providers.openrouter.max_retries, 3);
        assert_eq!(cfg.providers.gemini.models.general, "gemini-pro");
    }

    #[test]
    fn test_default_config_file_parses() {
        let cfg: AppConfig = toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.router.max_prompt_chars, 6000);
        assert_eq!(cfg.providers.openrouter.models.coding, "deepseek/deepseek-coder");
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = Some(dir.path().join("nope.toml"));
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let mut cfg = AppConfig::default();
        cfg.providers.gemini.api_key = "AIzaSyVerySecretKey".to_string();
        cfg.providers.openrouter.api_key = "sk-or-v1-secret-1234".to_string();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("VerySecret"));
        assert!(!debug.contains("secret-1234"));
        assert!(debug.contains("AIz...tKey"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("abcdefghij"), "abc...ghij");
    }

    #[test]
    fn test_missing_keys_warned_once_each() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router]\nmax_prompt_chars = 10").unwrap();
        let path = Some(file.path().to_path_buf());

        let logs = CapturedLogs::default();
        let mut cfg = logs.capture(|| AppConfig::load(&path)).unwrap();
        assert!(!logs.text().contains("API_KEY"), "load should not warn: {}", logs.text());

        cfg.providers.gemini.api_key.clear();
        cfg.providers.openrouter.api_key.clear();
        logs.capture(|| cfg.build_router()).unwrap();
        let text = logs.text();
        assert_eq!(text.matches("GEMINI_API_KEY").count(), 1, "{text}");
        assert_eq!(text.matches("OPEN_ROUTER_API_KEY").count(), 1, "{text}");
    }

    #[test]
    fn test_build_router() {
        let mut cfg = AppConfig::default();
        cfg.router.max_prompt_chars = 42;
        let router = cfg.build_router().unwrap();
        assert_eq!(router.config().max_prompt_chars, 42);
    }
}
