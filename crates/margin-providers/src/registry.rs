//! Provider registry — static specs for every supported provider, and the
//! factory that turns a provider key into a handler.
//!
//! Each `ProviderSpec` describes how to reach a provider: default endpoint,
//! env var for the key, default and known models, wire format.

use std::sync::Arc;

use tracing::debug;

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::{Message, QueryConfig};

use crate::adapters;
use crate::gemini::GeminiHandler;
use crate::openai_compat::OpenAiCompatibleHandler;
use crate::traits::{BaseHandler, QueryResult};
use crate::transport::Transport;

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Request/response format a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    OpenAiCompatible,
    Gemini,
}

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Registry key (e.g. `"openrouter"`).
    pub name: &'static str,
    /// Human-readable name for listings.
    pub display_name: &'static str,
    /// Environment variable consulted when no key is configured. Empty for
    /// key-less providers.
    pub env_key: &'static str,
    pub default_base_url: &'static str,
    /// Model used when the caller names none. Empty for Custom.
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    /// Substrings of model names this provider owns (lowercase).
    /// Hosts that serve other vendors' models (Groq, Together, …) have none.
    pub keywords: &'static [&'static str],
    /// Self-hosted endpoint that may run without a key.
    pub is_local: bool,
    pub wire: WireFormat,
}

impl ProviderSpec {
    /// API key from the provider's environment variable, if set.
    pub fn env_api_key(&self) -> Option<String> {
        if self.env_key.is_empty() {
            return None;
        }
        std::env::var(self.env_key)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

// ─────────────────────────────────────────────
// All providers
// ─────────────────────────────────────────────

/// Complete list of supported providers. Order is the keyword-matching priority.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        env_key: "DEEPSEEK_API_KEY",
        default_base_url: "https://api.deepseek.com",
        default_model: "deepseek-chat",
        models: &["deepseek-chat", "deepseek-reasoner"],
        keywords: &["deepseek"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        env_key: "OPENAI_API_KEY",
        default_base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        models: &["gpt-4o-mini", "gpt-4o", "gpt-4.1", "gpt-5", "gpt-5-mini", "o3", "o4-mini"],
        keywords: &["gpt-", "chatgpt"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Google Gemini",
        env_key: "GEMINI_API_KEY",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        default_model: "gemini-2.5-flash",
        models: &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"],
        keywords: &["gemini"],
        is_local: false,
        wire: WireFormat::Gemini,
    },
    ProviderSpec {
        name: "mistral",
        display_name: "Mistral",
        env_key: "MISTRAL_API_KEY",
        default_base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-small-latest",
        models: &[
            "mistral-small-latest",
            "mistral-medium-latest",
            "mistral-large-latest",
            "magistral-medium-latest",
        ],
        keywords: &["mistral", "magistral", "codestral"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "kimi",
        display_name: "Kimi (Moonshot)",
        env_key: "MOONSHOT_API_KEY",
        default_base_url: "https://api.moonshot.ai/v1",
        default_model: "kimi-k2-0905-preview",
        models: &["kimi-k2-0905-preview", "kimi-k2.5", "moonshot-v1-8k", "moonshot-v1-32k"],
        keywords: &["kimi", "moonshot"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "qwen",
        display_name: "Qwen (DashScope)",
        env_key: "DASHSCOPE_API_KEY",
        default_base_url: "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        default_model: "qwen-plus",
        models: &["qwen-plus", "qwen-max", "qwen-turbo", "qwen3-235b-a22b"],
        keywords: &["qwen", "qwq"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "zai",
        display_name: "Z.AI",
        env_key: "ZAI_API_KEY",
        default_base_url: "https://api.z.ai/api/paas/v4",
        default_model: "glm-4.6",
        models: &["glm-4.6", "glm-4.5", "glm-4.5-air"],
        keywords: &["glm"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "xai",
        display_name: "xAI",
        env_key: "XAI_API_KEY",
        default_base_url: "https://api.x.ai/v1",
        default_model: "grok-3-mini",
        models: &["grok-3-mini", "grok-3", "grok-4"],
        keywords: &["grok"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "doubao",
        display_name: "Doubao (Volcengine)",
        env_key: "ARK_API_KEY",
        default_base_url: "https://ark.cn-beijing.volces.com/api/v3",
        default_model: "doubao-seed-1-6-250615",
        models: &["doubao-seed-1-6-250615", "doubao-1-5-pro-32k-250115"],
        keywords: &["doubao"],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        env_key: "GROQ_API_KEY",
        default_base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        models: &[
            "llama-3.3-70b-versatile",
            "llama-3.1-8b-instant",
            "deepseek-r1-distill-llama-70b",
            "qwen/qwen3-32b",
            "openai/gpt-oss-120b",
        ],
        keywords: &[],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "fireworks",
        display_name: "Fireworks",
        env_key: "FIREWORKS_API_KEY",
        default_base_url: "https://api.fireworks.ai/inference/v1",
        default_model: "accounts/fireworks/models/llama-v3p3-70b-instruct",
        models: &[
            "accounts/fireworks/models/llama-v3p3-70b-instruct",
            "accounts/fireworks/models/deepseek-r1",
            "accounts/fireworks/models/qwen3-235b-a22b",
        ],
        keywords: &[],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "together",
        display_name: "Together AI",
        env_key: "TOGETHER_API_KEY",
        default_base_url: "https://api.together.xyz/v1",
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        models: &[
            "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            "deepseek-ai/DeepSeek-R1",
            "Qwen/Qwen2.5-72B-Instruct-Turbo",
        ],
        keywords: &[],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "sambanova",
        display_name: "SambaNova",
        env_key: "SAMBANOVA_API_KEY",
        default_base_url: "https://api.sambanova.ai/v1",
        default_model: "Meta-Llama-3.3-70B-Instruct",
        models: &["Meta-Llama-3.3-70B-Instruct", "DeepSeek-R1", "DeepSeek-V3-0324"],
        keywords: &[],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        env_key: "OPENROUTER_API_KEY",
        default_base_url: "https://openrouter.ai/api/v1",
        default_model: "openai/gpt-4o-mini",
        models: &[
            "openai/gpt-4o-mini",
            "anthropic/claude-sonnet-4",
            "google/gemini-2.5-flash",
            "deepseek/deepseek-r1",
        ],
        keywords: &[],
        is_local: false,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama",
        env_key: "",
        default_base_url: "http://localhost:11434/v1",
        default_model: "llama3.2",
        models: &["llama3.2", "qwen3", "deepseek-r1"],
        keywords: &[],
        is_local: true,
        wire: WireFormat::OpenAiCompatible,
    },
    ProviderSpec {
        name: "custom",
        display_name: "Custom (OpenAI-compatible)",
        env_key: "",
        default_base_url: "",
        default_model: "",
        models: &[],
        keywords: &[],
        is_local: true,
        wire: WireFormat::OpenAiCompatible,
    },
];

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Find the provider that owns a model name, by keyword.
///
/// Hosts and local providers never match; they serve other vendors' models.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    // A vendor prefix (`deepseek/deepseek-r1`) names the owner directly.
    let name = model_lower.rsplit('/').next().unwrap_or(&model_lower);
    PROVIDERS.iter().find(|spec| {
        !spec.is_local && spec.keywords.iter().any(|kw| name.contains(kw))
    })
}

// ─────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────

/// Create the handler for a provider key.
pub fn create_handler(
    provider: &str,
    transport: Transport,
) -> PipelineResult<Arc<dyn BaseHandler>> {
    let spec = find_by_name(provider).ok_or_else(|| {
        PipelineError::config(format!(
            "Unknown provider '{provider}'. Run `margin providers` to list supported providers."
        ))
    })?;

    debug!(provider = spec.name, wire = ?spec.wire, "Creating provider handler");

    let handler: Arc<dyn BaseHandler> = match spec.wire {
        WireFormat::Gemini => Arc::new(GeminiHandler::new(spec, transport)),
        WireFormat::OpenAiCompatible => {
            let adapter = adapters::adapter_for(spec.name).ok_or_else(|| {
                PipelineError::config(format!("No adapter registered for provider '{}'", spec.name))
            })?;
            Arc::new(OpenAiCompatibleHandler::new(spec, adapter, transport))
        }
    };
    Ok(handler)
}

/// Route a call to the handler named by `config.provider`.
pub async fn query(
    messages: &[Message],
    config: &QueryConfig,
    transport: &Transport,
) -> QueryResult {
    match create_handler(&config.provider, transport.clone()) {
        Ok(handler) => handler.query(messages, config).await,
        Err(e) => QueryResult::Failed(e),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
