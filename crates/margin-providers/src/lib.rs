//! LLM provider layer for Margin.
//!
//! One call shape for many chat-completion backends: hand in a conversation
//! and a [`QueryConfig`](margin_core::QueryConfig), get back a completion, a
//! stream, a deferred request, or a classified error.
//!
//! # Architecture
//!
//! - [`traits::BaseHandler`] — contract every handler implements; `query` lives here
//! - [`openai_compat::OpenAiCompatibleHandler`] — template for OpenAI-shape providers
//! - [`adapters`] — per-provider hooks plugged into the template
//! - [`gemini::GeminiHandler`] — Google's non-conforming wire format
//! - [`constraints`] — forced and capped sampling parameters
//! - [`response`] — parsers keyed by provider, [`reasoning`] — think-tag extraction
//! - [`transport`] / [`stream`] — HTTP dispatch and SSE decoding
//! - [`registry`] — static provider specs and [`registry::create_handler`]

pub mod adapters;
pub mod constraints;
pub mod gemini;
pub mod openai_compat;
pub mod reasoning;
pub mod registry;
pub mod request;
pub mod response;
pub mod stream;
pub mod traits;
pub mod transport;

// Re-export main types for convenience
pub use openai_compat::OpenAiCompatibleHandler;
pub use registry::{create_handler, find_by_model, find_by_name, query, ProviderSpec, PROVIDERS};
pub use request::RequestEnvelope;
pub use stream::{StreamChunk, StreamHandle, StreamState};
pub use traits::{BaseHandler, ProviderAdapter, QueryResult};
pub use transport::{DeferredRequest, Transport};
