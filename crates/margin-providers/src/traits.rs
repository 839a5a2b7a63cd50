//! Handler contracts.
//!
//! [`BaseHandler`] is what every provider handler offers its caller: one
//! `query` call returning a uniform [`QueryResult`]. [`ProviderAdapter`] is the
//! set of hooks an OpenAI-compatible provider may override; the
//! `OpenAiCompatibleHandler` in `openai_compat.rs` runs them in a fixed order.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::{Completion, Message, QueryConfig};

use crate::request::{Headers, JsonObject, RequestEnvelope};
use crate::response::{decode_payload, ResponseParser};
use crate::stream::StreamHandle;
use crate::transport::{
    self, identity_enhancer, BackgroundHandle, DeferredRequest, ErrorEnhancer, Transport,
};

// ─────────────────────────────────────────────
// QueryResult
// ─────────────────────────────────────────────

/// Outcome of [`BaseHandler::query`].
#[derive(Debug)]
pub enum QueryResult {
    /// One-shot answer, already parsed.
    Complete(Completion),
    /// Incremental answer.
    Streaming(StreamHandle),
    /// Unexecuted one-shot request (`features.background_requests`).
    Deferred(DeferredRequest),
    Failed(PipelineError),
}

impl QueryResult {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Failed(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            QueryResult::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Drive any variant to a final completion.
    pub async fn into_completion(self) -> PipelineResult<Completion> {
        match self {
            QueryResult::Complete(c) => Ok(c),
            QueryResult::Streaming(stream) => stream.collect().await,
            QueryResult::Deferred(deferred) => deferred.resolve().await,
            QueryResult::Failed(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────
// BaseHandler
// ─────────────────────────────────────────────

/// Capability contract shared by all provider handlers.
///
/// Implementors supply request construction and parser selection; dispatch,
/// status normalization and result shaping are inherited.
#[async_trait]
pub trait BaseHandler: Send + Sync {
    /// Registry key (e.g. `"groq"`).
    fn provider_key(&self) -> &str;

    /// Human-readable name used in logs and error messages.
    fn display_name(&self) -> &str;

    fn transport(&self) -> &Transport;

    /// Build the provider-specific request. Fails fast on invalid config.
    fn build_request(
        &self,
        messages: &[Message],
        config: &QueryConfig,
    ) -> PipelineResult<RequestEnvelope>;

    fn response_parser(&self) -> PipelineResult<ResponseParser>;

    /// Error rewriting applied to every failure of a call with `config`.
    fn error_enhancer(&self, _config: &QueryConfig) -> ErrorEnhancer {
        identity_enhancer()
    }

    /// Issue the HTTP call without blocking the caller.
    fn background_request(
        &self,
        envelope: RequestEnvelope,
        parser: ResponseParser,
        enhance: ErrorEnhancer,
    ) -> BackgroundHandle {
        self.transport()
            .background_request(envelope, parser, self.display_name(), enhance)
    }

    /// Normalize connection failure and non-2xx status into a `NetworkError`.
    fn handle_api_response(
        &self,
        succeeded: bool,
        status: Option<u16>,
        chunks: &[String],
    ) -> PipelineResult<String> {
        transport::handle_api_response(succeeded, status, chunks, self.display_name())
    }

    /// Send a conversation and return a uniform result.
    ///
    /// Never panics and never returns a bare error string: failures come back
    /// as [`QueryResult::Failed`].
    async fn query(&self, messages: &[Message], config: &QueryConfig) -> QueryResult {
        let enhance = self.error_enhancer(config);
        let prepared = self
            .build_request(messages, config)
            .and_then(|envelope| Ok((envelope, self.response_parser()?)));
        let (envelope, parser) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(provider = self.provider_key(), error = %e, "Request not sent");
                return QueryResult::Failed(enhance(e));
            }
        };

        debug!(
            provider = self.provider_key(),
            model = %envelope.model,
            messages = messages.len(),
            streaming = envelope.streaming,
            "Calling LLM"
        );

        if !envelope.streaming && config.features.background_requests {
            return QueryResult::Deferred(DeferredRequest::new(
                self.transport().clone(),
                envelope,
                parser,
                self.display_name(),
                enhance,
            ));
        }

        match self.background_request(envelope, parser, enhance.clone()) {
            BackgroundHandle::Streaming(stream) => QueryResult::Streaming(stream),
            BackgroundHandle::Pending(pending) => {
                let raw = pending.wait().await;
                let parsed = self
                    .handle_api_response(raw.succeeded, raw.status, &raw.chunks)
                    .and_then(|body| decode_payload(&body, self.display_name()))
                    .and_then(|payload| parser.parse(&payload));
                match parsed {
                    Ok(completion) => {
                        debug!(
                            provider = self.provider_key(),
                            chars = completion.text.len(),
                            has_reasoning = completion.reasoning.is_some(),
                            "LLM response received"
                        );
                        QueryResult::Complete(completion)
                    }
                    Err(e) => {
                        error!(provider = self.provider_key(), error = %e, "LLM call failed");
                        QueryResult::Failed(enhance(e))
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// ProviderAdapter
// ─────────────────────────────────────────────

/// Hooks an OpenAI-compatible provider may override.
///
/// Identity is mandatory; every other hook defaults to "unchanged".
pub trait ProviderAdapter: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn provider_key(&self) -> &'static str;

    fn customize_headers(&self, headers: Headers, _config: &QueryConfig) -> Headers {
        headers
    }

    fn customize_url(&self, url: String, _config: &QueryConfig) -> String {
        url
    }

    fn customize_request_body(&self, body: JsonObject, _config: &QueryConfig) -> JsonObject {
        body
    }

    fn validate_config(&self, config: &QueryConfig) -> PipelineResult<()> {
        require_api_key(self.provider_name(), config)
    }

    /// Rewrite an error message. Classification is kept by the caller.
    fn enhance_error_message(&self, message: String, _config: &QueryConfig) -> String {
        message
    }

    fn supports_reasoning_extraction(&self) -> bool {
        false
    }

    fn response_parser_key(&self) -> &'static str {
        self.provider_key()
    }
}

/// Fail with a `ConfigError` when no API key is set.
pub fn require_api_key(provider_name: &str, config: &QueryConfig) -> PipelineResult<()> {
    match config.api_key() {
        Some(_) => Ok(()),
        None => Err(PipelineError::config(format!(
            "Missing API key for {provider_name}. Add it to the settings file or set the provider's API key environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::error::ErrorKind;

    struct Bare;

    impl ProviderAdapter for Bare {
        fn provider_name(&self) -> &'static str {
            "Bare"
        }

        fn provider_key(&self) -> &'static str {
            "bare"
        }
    }

    #[test]
    fn test_adapter_defaults() {
        let config = QueryConfig::new("bare", "m").with_api_key("k");
        let adapter = Bare;

        let mut headers = Headers::new();
        headers.insert("A".into(), "1".into());
        assert_eq!(adapter.customize_headers(headers.clone(), &config), headers);
        assert_eq!(adapter.customize_url("u".into(), &config), "u");
        assert!(adapter.customize_request_body(JsonObject::new(), &config).is_empty());
        assert_eq!(adapter.enhance_error_message("m".into(), &config), "m");
        assert!(!adapter.supports_reasoning_extraction());
        assert_eq!(adapter.response_parser_key(), "bare");
        assert!(adapter.validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let config = QueryConfig::new("bare", "m").with_api_key("   ");
        let err = Bare.validate_config(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("Missing API key"));
        assert!(err.to_string().starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_failed_result_into_completion() {
        let result = QueryResult::Failed(PipelineError::config("Missing API key"));
        assert!(result.is_error());
        assert_eq!(result.error().map(|e| e.kind()), Some(ErrorKind::Config));
        assert!(result.into_completion().await.is_err());

        let result = QueryResult::Complete(Completion::text("ok"));
        assert_eq!(result.into_completion().await.unwrap().text, "ok");
    }
}
