//! Google Gemini — the one provider that does not speak OpenAI chat completions.
//!
//! Differences from the template: the system instruction travels in its own
//! object, sampling parameters nest under `generationConfig`, the key goes in
//! `x-goog-api-key`, and the model is part of the URL rather than the body.

use std::fmt;

use serde_json::{json, Value};

use margin_core::error::PipelineResult;
use margin_core::types::{Message, QueryConfig, Role};

use crate::registry::ProviderSpec;
use crate::request::{base_headers, constrained_params, log_envelope, JsonObject, RequestEnvelope};
use crate::response::ResponseParser;
use crate::traits::{require_api_key, BaseHandler};
use crate::transport::Transport;

pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Separates a consolidated context preamble from the user's question.
pub const CONSOLIDATED_PREFIX_MARKER: &str = "[User Question]";

const GEMINI_KEY: &str = "gemini";
const GEMINI_NAME: &str = "Gemini";

// ─────────────────────────────────────────────
// Request shaping
// ─────────────────────────────────────────────

/// Split a conversation into `(system_instruction, contents)`.
///
/// System text comes from, in order: `config.system.text`, the preamble of the
/// first context-flagged message (text before [`CONSOLIDATED_PREFIX_MARKER`]),
/// and every explicit `system`-role message.
pub fn gemini_contents(messages: &[Message], config: &QueryConfig) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = config.system_text().map(str::trim).into_iter().collect();
    let mut contents = Vec::new();
    let mut context_scanned = false;

    for message in messages.iter().filter(|m| !m.is_blank()) {
        let mut content = message.content.as_str();

        if message.is_context && !context_scanned {
            context_scanned = true;
            if let Some((preamble, question)) = content.split_once(CONSOLIDATED_PREFIX_MARKER) {
                if !preamble.trim().is_empty() {
                    system_parts.push(preamble.trim());
                }
                content = question.trim();
                if content.is_empty() {
                    continue;
                }
            }
        }

        let role = match message.role {
            Role::System => {
                system_parts.push(content.trim());
                continue;
            }
            Role::Assistant => "model",
            Role::User | Role::Other(_) => "user",
        };
        contents.push(json!({"role": role, "parts": [{"text": content}]}));
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, contents)
}

/// `<base>/models/<model>:generateContent`, or the SSE streaming variant.
pub fn gemini_url(base: &str, model: &str, streaming: bool) -> String {
    let base = base.trim_end_matches('/');
    if streaming {
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    } else {
        format!("{base}/models/{model}:generateContent")
    }
}

// ─────────────────────────────────────────────
// GeminiHandler
// ─────────────────────────────────────────────

pub struct GeminiHandler {
    spec: &'static ProviderSpec,
    transport: Transport,
}

impl fmt::Debug for GeminiHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiHandler")
            .field("default_base_url", &self.spec.default_base_url)
            .finish()
    }
}

impl GeminiHandler {
    pub fn new(spec: &'static ProviderSpec, transport: Transport) -> Self {
        GeminiHandler { spec, transport }
    }
}

impl BaseHandler for GeminiHandler {
    fn provider_key(&self) -> &str {
        GEMINI_KEY
    }

    fn display_name(&self) -> &str {
        GEMINI_NAME
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn build_request(
        &self,
        messages: &[Message],
        config: &QueryConfig,
    ) -> PipelineResult<RequestEnvelope> {
        require_api_key(GEMINI_NAME, config)?;

        let model = match config.model.trim() {
            "" => self.spec.default_model,
            m => m,
        };
        let streaming = config.features.enable_streaming;
        let (system, contents) = gemini_contents(messages, config);
        let params = constrained_params(GEMINI_KEY, model, &config.api_params);

        let mut body = JsonObject::new();
        body.insert("contents".into(), Value::Array(contents));
        if let Some(system) = system {
            body.insert(
                "system_instruction".into(),
                json!({"parts": [{"text": system}]}),
            );
        }
        let mut generation = JsonObject::new();
        if let Some(temperature) = params.temperature {
            generation.insert("temperature".into(), Value::from(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            generation.insert("maxOutputTokens".into(), Value::from(max_tokens));
        }
        if !generation.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation));
        }

        let mut headers = base_headers(streaming);
        headers.insert(
            API_KEY_HEADER.to_string(),
            config.api_key().unwrap_or_default().to_string(),
        );

        let base = config.base_url().unwrap_or(self.spec.default_base_url);
        let envelope = RequestEnvelope {
            body: Value::Object(body),
            headers,
            url: gemini_url(base, model, streaming),
            model: model.to_string(),
            provider: GEMINI_KEY.to_string(),
            streaming,
        };
        log_envelope(&envelope, config.features.debug);
        Ok(envelope)
    }

    fn response_parser(&self) -> PipelineResult<ResponseParser> {
        ResponseParser::for_key(GEMINI_KEY, true)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
