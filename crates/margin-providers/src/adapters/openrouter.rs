//! OpenRouter — gateway to many upstream providers.
//!
//! OpenRouter attributes traffic through `HTTP-Referer` and `X-Title`.

use margin_core::types::QueryConfig;

use crate::request::Headers;
use crate::traits::ProviderAdapter;

pub const REFERER_HEADER: &str = "HTTP-Referer";
pub const TITLE_HEADER: &str = "X-Title";

const APP_REFERER: &str = "https://github.com/margin-reader/margin";
const APP_TITLE: &str = "Margin";

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenRouterAdapter;

impl ProviderAdapter for OpenRouterAdapter {
    fn provider_name(&self) -> &'static str {
        "OpenRouter"
    }

    fn provider_key(&self) -> &'static str {
        "openrouter"
    }

    fn customize_headers(&self, mut headers: Headers, _config: &QueryConfig) -> Headers {
        headers.insert(REFERER_HEADER.to_string(), APP_REFERER.to_string());
        headers.insert(TITLE_HEADER.to_string(), APP_TITLE.to_string());
        headers
    }

    fn supports_reasoning_extraction(&self) -> bool {
        true
    }
}
