//! Settings schema — what `~/.margin/config.json` may contain.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ApiParams, Features, QueryConfig, SystemConfig};

// ─────────────────────────────────────────────
// Root Settings
// ─────────────────────────────────────────────

/// Root settings — loaded from `~/.margin/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Provider used when the caller does not name one.
    pub provider: String,
    /// Model used when neither the caller nor the provider entry names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub api_params: ApiParams,
    pub features: Features,
    pub system: SystemConfig,
    /// Per-provider credentials, keyed by provider key (e.g. `"groq"`).
    pub providers: BTreeMap<String, ProviderSettings>,
    pub transport: TransportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_params: ApiParams {
                temperature: Some(0.7),
                max_tokens: Some(4096),
            },
            features: Features::default(),
            system: SystemConfig::default(),
            providers: BTreeMap::new(),
            transport: TransportSettings::default(),
        }
    }
}

impl Settings {
    /// Credentials for one provider, if configured at all.
    pub fn provider_settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }

    /// Preferred model for a provider from settings alone.
    ///
    /// The provider entry wins; the top-level model applies only to the
    /// top-level provider.
    pub fn model_for(&self, provider: &str) -> Option<&str> {
        self.provider_settings(provider)
            .and_then(|p| p.model.as_deref())
            .or_else(|| {
                if provider == self.provider {
                    self.model.as_deref()
                } else {
                    None
                }
            })
            .filter(|m| !m.is_empty())
    }

    /// Assemble the immutable per-call configuration for `provider`/`model`.
    pub fn query_config(&self, provider: &str, model: &str) -> QueryConfig {
        let entry = self.provider_settings(provider);
        QueryConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: entry
                .map(|p| p.api_key.clone())
                .filter(|k| !k.is_empty()),
            base_url: entry.and_then(|p| p.base_url.clone()),
            api_params: self.api_params.clone(),
            features: self.features.clone(),
            system: self.system.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single LLM provider (API key, base URL, model).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// API key for authentication.
    pub api_key: String,
    /// Custom base URL (overrides provider default and, for Qwen, the region).
    #[serde(skip_serializing_if = "Option::is_none", alias = "apiBase")]
    pub base_url: Option<String>,
    /// Preferred model for this provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderSettings {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────

/// HTTP timeouts applied by the transport layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Upper bound for a one-shot exchange, and for stream response headers.
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between two stream events.
    pub stream_idle_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 60,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.api_params.temperature, Some(0.7));
        assert_eq!(settings.transport.request_timeout_secs, 120);
        assert!(settings.providers.is_empty());
    }

    #[test]
    fn test_legacy_api_base_alias() {
        let entry: ProviderSettings = serde_json::from_value(json!({
            "apiKey": "k",
            "apiBase": "http://localhost:1234/v1"
        }))
        .unwrap();
        assert_eq!(entry.base_url.as_deref(), Some("http://localhost:1234/v1"));
    }

    #[test]
    fn test_query_config_copies_provider_entry() {
        let mut settings = Settings::default();
        settings.features.enable_streaming = true;
        settings.system.text = Some("You are a reading assistant.".into());
        settings.providers.insert(
            "qwen".into(),
            ProviderSettings {
                api_key: "sk-q".into(),
                base_url: None,
                model: Some("qwen-plus".into()),
            },
        );

        let config = settings.query_config("qwen", "qwen-plus");
        assert_eq!(config.api_key(), Some("sk-q"));
        assert!(config.base_url.is_none());
        assert!(config.features.enable_streaming);
        assert_eq!(config.system_text(), Some("You are a reading assistant."));
        assert_eq!(config.api_params.max_tokens, Some(4096));
    }

    #[test]
    fn test_query_config_unconfigured_provider() {
        let settings = Settings::default();
        let config = settings.query_config("groq", "llama-3.3-70b-versatile");
        assert!(config.api_key.is_none());
        assert_eq!(config.provider, "groq");
    }

    #[test]
    fn test_model_for_precedence() {
        let mut settings = Settings::default();
        settings.provider = "groq".into();
        settings.model = Some("top-level".into());
        assert_eq!(settings.model_for("groq"), Some("top-level"));
        assert_eq!(settings.model_for("mistral"), None);

        settings.providers.insert(
            "groq".into(),
            ProviderSettings {
                model: Some("entry".into()),
                ..Default::default()
            },
        );
        assert_eq!(settings.model_for("groq"), Some("entry"));
    }
}
