//! Response parsers — turning a decoded provider payload into a [`Completion`].
//!
//! Parsers are looked up by key in a static table. Several providers share the
//! OpenAI shape, so their keys all resolve to the same parse function; an
//! adapter may also point at another provider's key (Custom → `"openai"`).

use serde_json::Value;

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::Completion;
use margin_core::utils::truncate_string;

use crate::reasoning::{merge_reasoning, split_think_tags};
use crate::stream::StreamDialect;

/// A parse function over a decoded payload. The flag enables reasoning extraction.
pub type ParseFn = fn(&Value, bool) -> PipelineResult<Completion>;

/// Gemini finish reasons that mean the answer was withheld.
pub(crate) const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

/// Payload family a parser understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    OpenAi,
    Gemini,
}

struct ParserEntry {
    key: &'static str,
    shape: PayloadShape,
}

static PARSERS: &[ParserEntry] = &[
    ParserEntry {
        key: "openai",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "deepseek",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "groq",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "fireworks",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "kimi",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "together",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "openrouter",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "mistral",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "qwen",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "sambanova",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "doubao",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "zai",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "xai",
        shape: PayloadShape::OpenAi,
    },
    ParserEntry {
        key: "gemini",
        shape: PayloadShape::Gemini,
    },
];

// ─────────────────────────────────────────────
// ResponseParser
// ─────────────────────────────────────────────

/// A resolved parser plus the reasoning flag of the adapter using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseParser {
    key: &'static str,
    shape: PayloadShape,
    extract_reasoning: bool,
}

impl ResponseParser {
    /// Resolve a parser key. Unknown keys are a `ParseError`.
    pub fn for_key(key: &str, extract_reasoning: bool) -> PipelineResult<Self> {
        let entry = PARSERS
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| {
                PipelineError::parse(format!("No response parser registered for '{key}'"))
            })?;
        Ok(ResponseParser {
            key: entry.key,
            shape: entry.shape,
            extract_reasoning,
        })
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    pub fn extract_reasoning(&self) -> bool {
        self.extract_reasoning
    }

    /// Stream framing that matches this payload family.
    pub fn dialect(&self) -> StreamDialect {
        match self.shape {
            PayloadShape::OpenAi => StreamDialect::OpenAi,
            PayloadShape::Gemini => StreamDialect::Gemini,
        }
    }

    pub fn parse_fn(&self) -> ParseFn {
        match self.shape {
            PayloadShape::OpenAi => parse_openai,
            PayloadShape::Gemini => parse_gemini,
        }
    }

    pub fn parse(&self, payload: &Value) -> PipelineResult<Completion> {
        (self.parse_fn())(payload, self.extract_reasoning)
    }
}

/// Decode a raw body into JSON.
pub fn decode_payload(body: &str, label: &str) -> PipelineResult<Value> {
    serde_json::from_str(body).map_err(|e| {
        PipelineError::parse(format!(
            "{label} returned an undecodable response ({e}): {}",
            truncate_string(body.trim(), 200)
        ))
    })
}

// ─────────────────────────────────────────────
// Shared extraction helpers
// ─────────────────────────────────────────────

/// Message text of a provider `error` value (object or bare string).
pub(crate) fn provider_error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error");
            let status = obj.get("status").filter(|s| s.is_string());
            match status.or_else(|| obj.get("code")) {
                Some(Value::String(code)) if !code.is_empty() => format!("{message} ({code})"),
                Some(Value::Number(code)) => format!("{message} ({code})"),
                _ => message.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// A non-null top-level `error` field.
pub(crate) fn top_level_error(payload: &Value) -> Option<&Value> {
    payload.get("error").filter(|e| !e.is_null())
}

/// Why Gemini refused the prompt, if it did.
pub(crate) fn gemini_block_reason(payload: &Value) -> Option<&str> {
    payload
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Explicit reasoning field of an OpenAI-shape message or delta.
pub(crate) fn explicit_reasoning(message: &Value) -> Option<String> {
    non_empty_str(message.get("reasoning_content"))
        .or_else(|| non_empty_str(message.get("reasoning")))
}

/// Flatten structured content parts into `(text, thinking)`.
///
/// Mistral's reasoning models return `[{type: "thinking", thinking: [...]}, {type: "text", text}]`.
pub(crate) fn flatten_content_parts(parts: &[Value]) -> (String, Option<String>) {
    let mut text = String::new();
    let mut thinking = Vec::new();
    for part in parts {
        match part.get("type").and_then(Value::as_str) {
            Some("thinking") => {
                if let Some(inner) = part.get("thinking").and_then(Value::as_array) {
                    let joined: String = inner
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect();
                    if !joined.trim().is_empty() {
                        thinking.push(joined);
                    }
                }
            }
            _ => {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
        }
    }
    let thinking = if thinking.is_empty() {
        None
    } else {
        Some(thinking.join("\n\n"))
    };
    (text, thinking)
}

// ─────────────────────────────────────────────
// OpenAI shape
// ─────────────────────────────────────────────

/// Parse a chat-completion payload.
pub fn parse_openai(payload: &Value, extract_reasoning: bool) -> PipelineResult<Completion> {
    if let Some(error) = top_level_error(payload) {
        return Err(PipelineError::provider(provider_error_message(error)));
    }

    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::parse("Response has no 'choices' array"))?;
    let choice = choices
        .first()
        .ok_or_else(|| PipelineError::parse("Response 'choices' array is empty"))?;
    let message = choice
        .get("message")
        .filter(|m| m.is_object())
        .ok_or_else(|| PipelineError::parse("First choice has no 'message' object"))?;

    let (text, structured_thinking) = match message.get("content") {
        Some(Value::String(s)) => (s.clone(), None),
        Some(Value::Array(parts)) => flatten_content_parts(parts),
        Some(Value::Null) | None => {
            let finish = choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(PipelineError::parse(format!(
                "First choice has no message content (finish_reason: {finish})"
            )));
        }
        Some(other) => {
            return Err(PipelineError::parse(format!(
                "Unexpected message content type: {other}"
            )))
        }
    };

    if !extract_reasoning {
        return Ok(Completion::text(text));
    }

    let explicit = merge_reasoning(explicit_reasoning(message), structured_thinking);
    let (answer, inline) = split_think_tags(&text);
    Ok(Completion {
        text: answer,
        reasoning: merge_reasoning(explicit, inline),
    })
}

// ─────────────────────────────────────────────
// Gemini shape
// ─────────────────────────────────────────────

/// Text and thought parts of a Gemini candidate.
pub(crate) fn gemini_candidate_parts(candidate: &Value) -> (String, String) {
    let mut text = String::new();
    let mut thoughts = String::new();
    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        let Some(t) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            thoughts.push_str(t);
        } else {
            text.push_str(t);
        }
    }
    (text, thoughts)
}

/// Parse a `GenerateContentResponse`.
pub fn parse_gemini(payload: &Value, extract_reasoning: bool) -> PipelineResult<Completion> {
    if let Some(error) = top_level_error(payload) {
        return Err(PipelineError::provider(provider_error_message(error)));
    }
    if let Some(reason) = gemini_block_reason(payload) {
        return Err(PipelineError::provider(format!(
            "Gemini blocked the prompt ({reason})"
        )));
    }

    let candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| PipelineError::parse("Response has no candidates"))?;
    let finish = candidate.get("finishReason").and_then(Value::as_str);

    let (text, thoughts) = gemini_candidate_parts(candidate);
    if text.is_empty() {
        if let Some(reason) = finish.filter(|r| BLOCKING_FINISH_REASONS.contains(r)) {
            return Err(PipelineError::provider(format!(
                "Gemini withheld the response ({reason})"
            )));
        }
        if candidate.get("content").and_then(|c| c.get("parts")).is_none() {
            return Err(PipelineError::parse(format!(
                "First candidate has no content parts (finishReason: {})",
                finish.unwrap_or("unknown")
            )));
        }
    }

    let reasoning = if extract_reasoning && !thoughts.trim().is_empty() {
        Some(thoughts.trim().to_string())
    } else {
        None
    };
    Ok(Completion { text, reasoning })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
