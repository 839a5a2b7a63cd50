//! Request envelope and the shared pieces of request construction.
//!
//! A [`RequestEnvelope`] is the fully-prepared, provider-specific request:
//! built once per call, consumed by the transport, then discarded.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use margin_core::types::{ApiParams, Message, Role};
use margin_core::utils::redact_secret;

use crate::constraints;

/// Header map with deterministic ordering.
pub type Headers = BTreeMap<String, String>;

/// JSON object used for request bodies.
pub type JsonObject = serde_json::Map<String, Value>;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";
pub const ACCEPT: &str = "Accept";
pub const JSON_MIME: &str = "application/json";
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Headers whose values are secrets.
const SECRET_HEADERS: &[&str] = &[AUTHORIZATION, "x-goog-api-key"];

// ─────────────────────────────────────────────
// RequestEnvelope
// ─────────────────────────────────────────────

/// A prepared request for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestEnvelope {
    pub body: Value,
    pub headers: Headers,
    pub url: String,
    pub model: String,
    pub provider: String,
    /// Whether the response is expected as Server-Sent Events.
    pub streaming: bool,
}

impl RequestEnvelope {
    /// Headers with secret values masked, for logging.
    pub fn redacted_headers(&self) -> Headers {
        self.headers
            .iter()
            .map(|(name, value)| {
                let is_secret = SECRET_HEADERS
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(name));
                let shown = if is_secret {
                    redact_secret(value)
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }

    /// Serialized body bytes, as sent on the wire.
    pub fn body_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail.
        serde_json::to_vec(&self.body).unwrap_or_default()
    }
}

// ─────────────────────────────────────────────
// OpenAI-shape message list
// ─────────────────────────────────────────────

/// One message in an OpenAI chat-completion body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &'static str, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

/// Drop blank messages and map roles onto `user`/`assistant`.
///
/// Any role other than `assistant` becomes a user turn, including explicit
/// `system` entries inside the history; the system instruction travels
/// through `QueryConfig::system` instead.
pub fn normalize_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| !m.is_blank())
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "assistant",
                Role::User | Role::System | Role::Other(_) => "user",
            };
            ChatMessage::new(role, m.content.clone())
        })
        .collect()
}

// ─────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────

/// Build the chat completions URL from a base.
///
/// A base that already points at the endpoint is used verbatim.
pub fn completions_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

/// Run the constraint table and log every adjustment it made.
pub fn constrained_params(provider: &str, model: &str, params: &ApiParams) -> ApiParams {
    let (adjusted, adjustments) = constraints::apply(provider, model, params);
    for adj in &adjustments {
        info!(
            provider,
            model,
            param = adj.param,
            from = adj.from,
            to = adj.to,
            reason = adj.reason.unwrap_or("model requirement"),
            "Adjusted request parameter"
        );
    }
    adjusted
}

/// `Content-Type` plus `Accept` for streamed calls.
pub fn base_headers(streaming: bool) -> Headers {
    let mut headers = Headers::new();
    headers.insert(CONTENT_TYPE.to_string(), JSON_MIME.to_string());
    if streaming {
        headers.insert(ACCEPT.to_string(), EVENT_STREAM_MIME.to_string());
    }
    headers
}

/// Trace a built envelope; `dump` prints headers (redacted) and body.
pub fn log_envelope(envelope: &RequestEnvelope, dump: bool) {
    debug!(
        provider = %envelope.provider,
        model = %envelope.model,
        url = %envelope.url,
        streaming = envelope.streaming,
        "Built request"
    );
    if dump {
        info!(
            provider = %envelope.provider,
            headers = ?envelope.redacted_headers(),
            body = %envelope.body,
            "Request envelope"
        );
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_blank_and_maps_roles() {
        let messages = vec![
            Message::user("Hi"),
            Message::user("  "),
            Message::assistant("Hello"),
            Message::with_role(Role::Other("narrator".into()), "Meanwhile"),
            Message::system("sys in history"),
            Message::assistant("\n"),
        ];

        let out = normalize_messages(&messages);
        let roles: Vec<&str> = out.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "user"]);
        assert_eq!(out[2].content, "Meanwhile");
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        assert_eq!(
            completions_url("https://api.groq.com/openai/v1/"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_completions_url_full_endpoint() {
        assert_eq!(
            completions_url("http://localhost:1234/v1/chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_base_headers() {
        let headers = base_headers(false);
        assert_eq!(headers.get(CONTENT_TYPE).map(String::as_str), Some(JSON_MIME));
        assert!(!headers.contains_key(ACCEPT));

        let headers = base_headers(true);
        assert_eq!(
            headers.get(ACCEPT).map(String::as_str),
            Some(EVENT_STREAM_MIME)
        );
    }

    #[test]
    fn test_redacted_headers() {
        let mut headers = base_headers(false);
        headers.insert(AUTHORIZATION.into(), "Bearer sk-1234567890abcd".into());
        headers.insert("x-goog-api-key".into(), "AIzaSyExample1234".into());
        let envelope = RequestEnvelope {
            body: serde_json::json!({}),
            headers,
            url: "https://example.test".into(),
            model: "m".into(),
            provider: "p".into(),
            streaming: false,
        };

        let shown = envelope.redacted_headers();
        assert_eq!(shown[AUTHORIZATION], "****abcd");
        assert_eq!(shown["x-goog-api-key"], "****1234");
        assert_eq!(shown[CONTENT_TYPE], JSON_MIME);
    }
}
