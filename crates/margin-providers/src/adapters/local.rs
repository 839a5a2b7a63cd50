//! Self-hosted endpoints: any OpenAI-compatible server (Custom) and Ollama.
//!
//! Both may run without a key; the `Authorization` header is then dropped
//! rather than sent as an empty `Bearer`.

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::QueryConfig;

use crate::request::{Headers, JsonObject, AUTHORIZATION};
use crate::traits::ProviderAdapter;

/// Model families that only accept `max_completion_tokens`.
const COMPLETION_TOKEN_MODELS: &[&str] = &["gpt-5", "o1", "o3", "o4"];

fn drop_auth_without_key(mut headers: Headers, config: &QueryConfig) -> Headers {
    if config.api_key().is_none() {
        headers.remove(AUTHORIZATION);
    }
    headers
}

fn uses_completion_tokens(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    // Strip a vendor prefix such as `openai/`.
    let name = model.rsplit('/').next().unwrap_or(&model);
    COMPLETION_TOKEN_MODELS.iter().any(|p| name.starts_with(p))
}

// ─────────────────────────────────────────────
// Custom
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct CustomAdapter;

impl ProviderAdapter for CustomAdapter {
    fn provider_name(&self) -> &'static str {
        "Custom"
    }

    fn provider_key(&self) -> &'static str {
        "custom"
    }

    fn customize_headers(&self, headers: Headers, config: &QueryConfig) -> Headers {
        drop_auth_without_key(headers, config)
    }

    fn customize_request_body(&self, mut body: JsonObject, config: &QueryConfig) -> JsonObject {
        if uses_completion_tokens(&config.model) {
            if let Some(max_tokens) = body.remove("max_tokens") {
                body.insert("max_completion_tokens".into(), max_tokens);
            }
        }
        body
    }

    fn validate_config(&self, config: &QueryConfig) -> PipelineResult<()> {
        match config.base_url() {
            Some(_) => Ok(()),
            None => Err(PipelineError::config(
                "Missing base URL for Custom provider. Set base_url to your server's OpenAI-compatible endpoint.",
            )),
        }
    }

    fn supports_reasoning_extraction(&self) -> bool {
        true
    }

    fn response_parser_key(&self) -> &'static str {
        "openai"
    }
}

// ─────────────────────────────────────────────
// Ollama
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    fn provider_name(&self) -> &'static str {
        "Ollama"
    }

    fn provider_key(&self) -> &'static str {
        "ollama"
    }

    fn customize_headers(&self, headers: Headers, config: &QueryConfig) -> Headers {
        drop_auth_without_key(headers, config)
    }

    fn validate_config(&self, _config: &QueryConfig) -> PipelineResult<()> {
        Ok(())
    }

    fn supports_reasoning_extraction(&self) -> bool {
        true
    }

    fn response_parser_key(&self) -> &'static str {
        "openai"
    }
}
