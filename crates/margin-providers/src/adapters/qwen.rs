//! Qwen on Alibaba Cloud Model Studio (DashScope).
//!
//! API keys are region-bound: a key issued in Beijing is rejected by the
//! Singapore endpoint and vice versa, so the region picks the endpoint and an
//! auth failure gets a hint naming the region that was used.

use margin_core::types::QueryConfig;

use crate::traits::ProviderAdapter;

/// DashScope region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QwenRegion {
    #[default]
    International,
    China,
    Us,
}

impl QwenRegion {
    /// Parse a configured region name; unknown names fall back to international.
    pub fn from_config(config: &QueryConfig) -> Self {
        match config
            .features
            .qwen_region
            .as_deref()
            .map(|r| r.trim().to_lowercase())
            .as_deref()
        {
            Some("china") | Some("cn") | Some("beijing") => QwenRegion::China,
            Some("us") | Some("virginia") => QwenRegion::Us,
            _ => QwenRegion::International,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QwenRegion::International => "international",
            QwenRegion::China => "china",
            QwenRegion::Us => "us",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            QwenRegion::International => {
                "https://dashscope-intl.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
            QwenRegion::China => {
                "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
            QwenRegion::Us => {
                "https://dashscope-us.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
        }
    }
}

const AUTH_FAILURE_MARKERS: &[&str] = &[
    "HTTP 401",
    "HTTP 403",
    "InvalidApiKey",
    "Incorrect API key",
];

#[derive(Clone, Copy, Debug, Default)]
pub struct QwenAdapter;

impl ProviderAdapter for QwenAdapter {
    fn provider_name(&self) -> &'static str {
        "Qwen"
    }

    fn provider_key(&self) -> &'static str {
        "qwen"
    }

    fn customize_url(&self, url: String, config: &QueryConfig) -> String {
        if config.base_url().is_some() {
            return url;
        }
        QwenRegion::from_config(config).endpoint().to_string()
    }

    fn enhance_error_message(&self, message: String, config: &QueryConfig) -> String {
        if !AUTH_FAILURE_MARKERS.iter().any(|m| message.contains(m)) {
            return message;
        }
        if let Some(base_url) = config.base_url() {
            return format!(
                "{message} (Qwen API keys are region-specific; this request went to the \
                 configured base URL {base_url}, not a qwen_region endpoint. Check that your \
                 key was issued for the region that URL serves.)"
            );
        }
        let region = QwenRegion::from_config(config);
        format!(
            "{message} (Qwen API keys are region-specific; this request used the {} endpoint. \
             Check that your key was issued for that region or change qwen_region.)",
            region.as_str()
        )
    }

    fn supports_reasoning_extraction(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(region: Option<&str>) -> QueryConfig {
        let mut config = QueryConfig::new("qwen", "qwen-plus").with_api_key("sk-q");
        config.features.qwen_region = region.map(String::from);
        config
    }

    #[test]
    fn test_region_endpoints() {
        let default_url = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1/chat/completions";
        assert_eq!(QwenAdapter.customize_url("ignored".into(), &config(None)), default_url);
        assert_eq!(
            QwenAdapter.customize_url("ignored".into(), &config(Some("china"))),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
        assert_eq!(
            QwenAdapter.customize_url("ignored".into(), &config(Some("US"))),
            "https://dashscope-us.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
        assert_eq!(
            QwenAdapter.customize_url("ignored".into(), &config(Some("mars"))),
            default_url
        );
    }

    #[test]
    fn test_base_url_wins_over_region() {
        let cfg = config(Some("china")).with_base_url("https://proxy.example/v1");
        let url = "https://proxy.example/v1/chat/completions".to_string();
        assert_eq!(QwenAdapter.customize_url(url.clone(), &cfg), url);
    }

    #[test]
    fn test_auth_failure_hint() {
        let msg = QwenAdapter.enhance_error_message(
            "Qwen API error (HTTP 401): Incorrect API key provided.".into(),
            &config(Some("china")),
        );
        assert!(msg.starts_with("Qwen API error (HTTP 401)"));
        assert!(msg.contains("china endpoint"));
    }

    #[test]
    fn test_auth_failure_hint_names_base_url_override() {
        let cfg = config(None).with_base_url("https://my-proxy.example/v1");
        let msg = QwenAdapter.enhance_error_message(
            "Qwen API error (HTTP 403): InvalidApiKey".into(),
            &cfg,
        );
        assert!(msg.contains("https://my-proxy.example/v1"));
        assert!(!msg.contains("international endpoint"));
    }

    #[test]
    fn test_other_errors_untouched() {
        let msg = "Qwen API error (HTTP 500): internal".to_string();
        assert_eq!(QwenAdapter.enhance_error_message(msg.clone(), &config(None)), msg);
    }
}
