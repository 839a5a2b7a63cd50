//! Core types for Margin — the conversation and per-call configuration that
//! flow into the request pipeline, and the uniform result that flows out.
//!
//! Everything here is caller-owned: the pipeline only reads messages and
//! configuration, and hands back fresh values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Speaker of a message.
///
/// Unknown role strings are preserved as [`Role::Other`] so that the request
/// builders can decide how to map them (OpenAI-shape bodies coerce them to
/// `user`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// One turn of a conversation, in chronological order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Synthetic message assembled by the host (book context, consolidated
    /// system prefix) rather than typed by the user.
    #[serde(default)]
    pub is_context: bool,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a context-flagged user message.
    pub fn context(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            is_context: true,
        }
    }

    pub fn with_role(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            is_context: false,
        }
    }

    /// Whether the message carries no usable text.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

// ─────────────────────────────────────────────
// Per-call configuration
// ─────────────────────────────────────────────

/// Sampling parameters supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Feature switches consulted by the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    /// Deliver the answer as Server-Sent-Event chunks.
    pub enable_streaming: bool,
    /// Dump every prepared request envelope (key redacted).
    pub debug: bool,
    /// Qwen/DashScope region: `international` (default), `china`, or `us`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qwen_region: Option<String>,
    /// Return one-shot requests unexecuted, for the caller's scheduler to run.
    pub background_requests: bool,
    /// Host-specific switches the pipeline does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// System instruction supplied alongside the conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Provider-agnostic configuration for one `query` call.
///
/// Immutable for the duration of the call; anything the pipeline adjusts is
/// adjusted on a copy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub api_params: ApiParams,
    pub features: Features,
    pub system: SystemConfig,
}

impl QueryConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        QueryConfig {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.api_params.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.api_params.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.features.enable_streaming = enabled;
        self
    }

    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.system.text = Some(text.into());
        self
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    /// The base URL override, if one is set and non-blank.
    pub fn base_url(&self) -> Option<&str> {
        non_blank(self.base_url.as_deref())
    }

    /// The system instruction, if one is set and non-blank.
    pub fn system_text(&self) -> Option<&str> {
        non_blank(self.system.text.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ─────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────

/// A successfully parsed answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Auxiliary "thinking" channel, when the provider returned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Completion {
            text: text.into(),
            reasoning: None,
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
    fn test_role_round_trip() {
        let msg: Message = serde_json::from_value(json!({
            "role": "narrator",
            "content": "Once upon a time"
        }))
        .unwrap();

        assert_eq!(msg.role, Role::Other("narrator".to_string()));
        assert!(!msg.is_context);

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["role"], "narrator");
    }

    #[test]
    fn test_known_roles_deserialize() {
        let msgs: Vec<Message> = serde_json::from_value(json!([
            {"role": "user", "content": "a"},
            {"role": "assistant", "content": "b"},
            {"role": "system", "content": "c", "is_context": true}
        ]))
        .unwrap();

        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[2].role, Role::System);
        assert!(msgs[2].is_context);
    }

    #[test]
    fn test_blank_message() {
        assert!(Message::user("   \n\t").is_blank());
        assert!(!Message::user(" hi ").is_blank());
    }

    #[test]
    fn test_context_message_is_user_turn() {
        let msg = Message::context("Book: Dune");
        assert_eq!(msg.role, Role::User);
        assert!(msg.is_context);
    }

    #[test]
    fn test_blank_key_is_absent() {
        let config = QueryConfig::new("groq", "llama").with_api_key("  ");
        assert!(config.api_key().is_none());

        let config = config.with_api_key("gsk-1");
        assert_eq!(config.api_key(), Some("gsk-1"));
    }

    #[test]
    fn test_query_config_from_camel_case_json() {
        let config: QueryConfig = serde_json::from_value(json!({
            "provider": "qwen",
            "model": "qwen-max",
            "apiKey": "sk-1",
            "apiParams": {"temperature": 0.3, "maxTokens": 512},
            "features": {"enableStreaming": true, "qwenRegion": "china", "highlightColor": "yellow"},
            "system": {"text": "Be brief."}
        }))
        .unwrap();

        assert_eq!(config.api_params.max_tokens, Some(512));
        assert!(config.features.enable_streaming);
        assert_eq!(config.features.qwen_region.as_deref(), Some("china"));
        assert_eq!(config.features.extra["highlightColor"], "yellow");
        assert_eq!(config.system_text(), Some("Be brief."));
    }
}
