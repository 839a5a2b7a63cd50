//! Providers that speak plain OpenAI chat completions with Bearer auth.
//!
//! They differ only in identity and in whether their hosted models leak
//! reasoning (`reasoning_content` or inline think tags), so one data-driven
//! adapter covers them all.

use crate::traits::ProviderAdapter;

/// An adapter that overrides nothing but identity and the reasoning flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardAdapter {
    pub key: &'static str,
    pub name: &'static str,
    pub reasoning: bool,
}

impl ProviderAdapter for StandardAdapter {
    fn provider_name(&self) -> &'static str {
        self.name
    }

    fn provider_key(&self) -> &'static str {
        self.key
    }

    fn supports_reasoning_extraction(&self) -> bool {
        self.reasoning
    }
}

pub const OPENAI: StandardAdapter = StandardAdapter {
    key: "openai",
    name: "OpenAI",
    reasoning: false,
};

pub const DEEPSEEK: StandardAdapter = StandardAdapter {
    key: "deepseek",
    name: "DeepSeek",
    reasoning: true,
};

pub const GROQ: StandardAdapter = StandardAdapter {
    key: "groq",
    name: "Groq",
    reasoning: true,
};

pub const FIREWORKS: StandardAdapter = StandardAdapter {
    key: "fireworks",
    name: "Fireworks",
    reasoning: true,
};

pub const KIMI: StandardAdapter = StandardAdapter {
    key: "kimi",
    name: "Kimi",
    reasoning: true,
};

pub const TOGETHER: StandardAdapter = StandardAdapter {
    key: "together",
    name: "Together AI",
    reasoning: true,
};

// Magistral returns structured thinking parts.
pub const MISTRAL: StandardAdapter = StandardAdapter {
    key: "mistral",
    name: "Mistral",
    reasoning: true,
};

pub const SAMBANOVA: StandardAdapter = StandardAdapter {
    key: "sambanova",
    name: "SambaNova",
    reasoning: true,
};

pub const DOUBAO: StandardAdapter = StandardAdapter {
    key: "doubao",
    name: "Doubao",
    reasoning: true,
};

pub const ZAI: StandardAdapter = StandardAdapter {
    key: "zai",
    name: "Z.AI",
    reasoning: true,
};

pub const XAI: StandardAdapter = StandardAdapter {
    key: "xai",
    name: "xAI",
    reasoning: true,
};

/// All standard adapters, for lookup by key.
pub static STANDARD_ADAPTERS: &[StandardAdapter] = &[
    OPENAI, DEEPSEEK, GROQ, FIREWORKS, KIMI, TOGETHER, MISTRAL, SAMBANOVA, DOUBAO, ZAI, XAI,
];
