//! Provider adapters: the hooks that make each OpenAI-compatible provider
//! differ from the template.

mod local;
mod openrouter;
mod qwen;
mod standard;

use std::sync::Arc;

use crate::traits::ProviderAdapter;

pub use local::{CustomAdapter, OllamaAdapter};
pub use openrouter::{OpenRouterAdapter, REFERER_HEADER, TITLE_HEADER};
pub use qwen::{QwenAdapter, QwenRegion};
pub use standard::{
    StandardAdapter, DEEPSEEK, DOUBAO, FIREWORKS, GROQ, KIMI, MISTRAL, OPENAI, SAMBANOVA,
    STANDARD_ADAPTERS, TOGETHER, XAI, ZAI,
};

/// The adapter for an OpenAI-compatible provider key.
pub fn adapter_for(key: &str) -> Option<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match key {
        "openrouter" => Arc::new(OpenRouterAdapter),
        "qwen" => Arc::new(QwenAdapter),
        "custom" => Arc::new(CustomAdapter),
        "ollama" => Arc::new(OllamaAdapter),
        other => Arc::new(*STANDARD_ADAPTERS.iter().find(|a| a.key == other)?),
    };
    Some(adapter)
}
