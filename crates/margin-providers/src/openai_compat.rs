//! Template handler for the OpenAI chat-completion wire format.
//!
//! One [`OpenAiCompatibleHandler`] serves every OpenAI-shape provider; the
//! differences live in its [`ProviderAdapter`]. Request construction is shared
//! and not overridable: normalize messages, apply parameters and constraints,
//! then run the adapter hooks (body, headers, URL) in that order.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::{Message, QueryConfig};

use crate::registry::ProviderSpec;
use crate::request::{
    base_headers, completions_url, constrained_params, log_envelope, normalize_messages,
    ChatMessage, JsonObject, RequestEnvelope, AUTHORIZATION,
};
use crate::response::ResponseParser;
use crate::traits::{BaseHandler, ProviderAdapter};
use crate::transport::{ErrorEnhancer, Transport};

// ─────────────────────────────────────────────
// OpenAiCompatibleHandler
// ─────────────────────────────────────────────

pub struct OpenAiCompatibleHandler {
    spec: &'static ProviderSpec,
    adapter: Arc<dyn ProviderAdapter>,
    transport: Transport,
}

impl fmt::Debug for OpenAiCompatibleHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleHandler")
            .field("provider", &self.adapter.provider_key())
            .field("default_base_url", &self.spec.default_base_url)
            .finish()
    }
}

impl OpenAiCompatibleHandler {
    pub fn new(
        spec: &'static ProviderSpec,
        adapter: Arc<dyn ProviderAdapter>,
        transport: Transport,
    ) -> Self {
        OpenAiCompatibleHandler {
            spec,
            adapter,
            transport,
        }
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    /// Build the request envelope for `messages` under `config`.
    ///
    /// Pure apart from logging: the same input always yields the same envelope.
    pub fn build_request_body(
        &self,
        messages: &[Message],
        config: &QueryConfig,
    ) -> PipelineResult<RequestEnvelope> {
        self.adapter.validate_config(config)?;

        let provider = self.adapter.provider_key();
        let model = match config.model.trim() {
            "" => self.spec.default_model,
            m => m,
        };
        let streaming = config.features.enable_streaming;

        let mut chat = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = config.system_text() {
            chat.push(ChatMessage::new("system", system));
        }
        chat.extend(normalize_messages(messages));

        let params = constrained_params(provider, model, &config.api_params);

        let mut body = JsonObject::new();
        body.insert("model".into(), Value::from(model));
        body.insert("messages".into(), serde_json::to_value(&chat).unwrap_or_default());
        if let Some(temperature) = params.temperature {
            body.insert("temperature".into(), Value::from(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            body.insert("max_tokens".into(), Value::from(max_tokens));
        }
        if streaming {
            body.insert("stream".into(), Value::Bool(true));
        }
        let body = self.adapter.customize_request_body(body, config);

        let mut headers = base_headers(streaming);
        headers.insert(
            AUTHORIZATION.to_string(),
            format!("Bearer {}", config.api_key().unwrap_or_default()),
        );
        let headers = self.adapter.customize_headers(headers, config);

        let base = config.base_url().unwrap_or(self.spec.default_base_url);
        let url = self.adapter.customize_url(completions_url(base), config);

        let envelope = RequestEnvelope {
            body: Value::Object(body),
            headers,
            url,
            model: model.to_string(),
            provider: provider.to_string(),
            streaming,
        };
        log_envelope(&envelope, config.features.debug);
        Ok(envelope)
    }
}

impl BaseHandler for OpenAiCompatibleHandler {
    fn provider_key(&self) -> &str {
        self.adapter.provider_key()
    }

    fn display_name(&self) -> &str {
        self.adapter.provider_name()
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn build_request(
        &self,
        messages: &[Message],
        config: &QueryConfig,
    ) -> PipelineResult<RequestEnvelope> {
        self.build_request_body(messages, config)
    }

    fn response_parser(&self) -> PipelineResult<ResponseParser> {
        ResponseParser::for_key(
            self.adapter.response_parser_key(),
            self.adapter.supports_reasoning_extraction(),
        )
    }

    fn error_enhancer(&self, config: &QueryConfig) -> ErrorEnhancer {
        let adapter = Arc::clone(&self.adapter);
        let config = config.clone();
        Arc::new(move |e: PipelineError| {
            let message = adapter.enhance_error_message(e.message().to_string(), &config);
            e.with_message(message)
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters;
    use crate::registry::find_by_name;
    use crate::traits::QueryResult;
    use margin_core::error::ErrorKind;
    use margin_core::types::Role;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler(provider: &str) -> OpenAiCompatibleHandler {
        let spec = find_by_name(provider).unwrap();
        let adapter = adapters::adapter_for(provider).unwrap();
        OpenAiCompatibleHandler::new(spec, adapter, Transport::with_defaults().unwrap())
    }

    fn config(provider: &str, model: &str) -> QueryConfig {
        QueryConfig::new(provider, model).with_api_key("sk-test-1234567890")
    }

    // ── Request construction ──

    #[test]
    fn test_mistral_end_to_end_body() {
        let h = handler("mistral");
        let env = h
            .build_request_body(
                &[Message::user("Hi"), Message::user("  ")],
                &config("mistral", "mistral-large-latest"),
            )
            .unwrap();
        assert_eq!(
            env.body["messages"],
            serde_json::json!([{"role": "user", "content": "Hi"}])
        );
        assert_eq!(env.url, "https://api.mistral.ai/v1/chat/completions");
        assert_eq!(env.headers[AUTHORIZATION], "Bearer sk-test-1234567890");
        assert_eq!(env.headers["Content-Type"], "application/json");
        assert!(env.body.get("stream").is_none());
    }

    #[test]
    fn test_system_prepended_and_roles_mapped() {
        let h = handler("groq");
        let messages = vec![
            Message::with_role(Role::Other("tool".into()), "result"),
            Message::assistant("ok"),
        ];
        let cfg = config("groq", "llama-3.3-70b-versatile").with_system("Be brief.");
        let env = h.build_request_body(&messages, &cfg).unwrap();
        let roles: Vec<&str> = env.body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(env.body["messages"][0]["content"], "Be brief.");
    }

    #[test]
    fn test_blank_system_text_skipped() {
        let h = handler("groq");
        let cfg = config("groq", "m").with_system("   ");
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();
        assert_eq!(env.body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_params_and_constraints_applied() {
        let h = handler("openai");
        let cfg = config("openai", "gpt-5-mini")
            .with_temperature(0.2)
            .with_max_tokens(512);
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();
        assert_eq!(env.body["temperature"], 1.0);
        assert_eq!(env.body["max_tokens"], 512);
        // The caller's value is untouched.
        assert_eq!(cfg.api_params.temperature, Some(0.2));
    }

    #[test]
    fn test_mistral_temperature_capped() {
        let h = handler("mistral");
        let cfg = config("mistral", "mistral-small").with_temperature(1.9);
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();
        assert_eq!(env.body["temperature"], 1.5);
    }

    #[test]
    fn test_streaming_flags() {
        let h = handler("together");
        let cfg = config("together", "m").with_streaming(true);
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();
        assert!(env.streaming);
        assert_eq!(env.body["stream"], true);
        assert_eq!(env.headers["Accept"], "text/event-stream");
    }

    #[test]
    fn test_base_url_override_and_full_endpoint() {
        let h = handler("fireworks");
        let cfg = config("fireworks", "m").with_base_url("https://proxy.local/v1/chat/completions");
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();
        assert_eq!(env.url, "https://proxy.local/v1/chat/completions");
    }

    #[test]
    fn test_empty_model_uses_registry_default() {
        let h = handler("deepseek");
        let env = h
            .build_request_body(&[Message::user("q")], &config("deepseek", " "))
            .unwrap();
        assert_eq!(env.model, find_by_name("deepseek").unwrap().default_model);
        assert_eq!(env.body["model"], env.model.as_str());
    }

    /// Records the order in which the template calls its hooks.
    #[derive(Default)]
    struct RecordingAdapter {
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingAdapter {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ProviderAdapter for RecordingAdapter {
        fn provider_name(&self) -> &'static str {
            "Recording"
        }

        fn provider_key(&self) -> &'static str {
            "groq"
        }

        fn customize_request_body(
            &self,
            mut body: JsonObject,
            _config: &QueryConfig,
        ) -> JsonObject {
            self.record(format!("body:stream={}", body.contains_key("stream")));
            body.insert("tagged".into(), Value::Bool(true));
            body
        }

        fn customize_headers(
            &self,
            mut headers: crate::request::Headers,
            _config: &QueryConfig,
        ) -> crate::request::Headers {
            self.record(format!("headers:auth={}", headers.contains_key(AUTHORIZATION)));
            headers.insert("X-Hook".into(), "1".into());
            headers
        }

        fn customize_url(&self, url: String, _config: &QueryConfig) -> String {
            self.record(format!("url:{url}"));
            format!("{url}?hooked=1")
        }
    }

    #[test]
    fn test_hooks_run_body_then_headers_then_url() {
        let adapter = Arc::new(RecordingAdapter::default());
        let h = OpenAiCompatibleHandler::new(
            find_by_name("groq").unwrap(),
            adapter.clone(),
            Transport::with_defaults().unwrap(),
        );
        let cfg = config("groq", "m").with_streaming(true);
        let env = h.build_request_body(&[Message::user("q")], &cfg).unwrap();

        let calls = adapter.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "body:stream=true".to_string(),
                "headers:auth=true".to_string(),
                "url:https://api.groq.com/openai/v1/chat/completions".to_string(),
            ]
        );
        assert_eq!(env.body["tagged"], true);
        assert_eq!(env.headers["X-Hook"], "1");
        assert!(env.url.ends_with("?hooked=1"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let h = handler("openrouter");
        let messages = vec![
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::user("More"),
        ];
        let cfg = config("openrouter", "anthropic/claude-sonnet-4")
            .with_temperature(0.3)
            .with_system("sys");
        let a = h.build_request_body(&messages, &cfg).unwrap();
        let b = h.build_request_body(&messages, &cfg).unwrap();
        assert_eq!(a.body_bytes(), b.body_bytes());
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn test_missing_key_fails_before_io() {
        let h = handler("xai");
        let err = h
            .build_request_body(&[Message::user("q")], &QueryConfig::new("xai", "grok-3"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("Missing API key"));
    }

    #[test]
    fn test_parser_selection() {
        assert_eq!(handler("groq").response_parser().unwrap().key(), "groq");
        assert_eq!(handler("custom").response_parser().unwrap().key(), "openai");
        assert!(handler("deepseek").response_parser().unwrap().extract_reasoning());
        assert!(!handler("openai").response_parser().unwrap().extract_reasoning());
    }

    #[test]
    fn test_display_name() {
        let h = OpenAiCompatibleHandler::new(
            find_by_name("sambanova").unwrap(),
            Arc::new(adapters::SAMBANOVA),
            Transport::with_defaults().unwrap(),
        );
        assert_eq!(h.display_name(), "SambaNova");
        assert_eq!(BaseHandler::provider_key(&h), "sambanova");
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_query_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-1234567890"))
            .and(body_partial_json(serde_json::json!({"model": "llama-3.3-70b-versatile"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "message": {"role": "assistant", "content": "<think>easy</think>4"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = handler("groq");
        let cfg = config("groq", "llama-3.3-70b-versatile").with_base_url(server.uri());
        match h.query(&[Message::user("2+2?")], &cfg).await {
            QueryResult::Complete(c) => {
                assert_eq!(c.text, "4");
                assert_eq!(c.reasoning.as_deref(), Some("easy"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached for model"}
            })))
            .mount(&server)
            .await;

        let h = handler("together");
        let cfg = config("together", "m").with_base_url(server.uri());
        let result = h.query(&[Message::user("q")], &cfg).await;
        let err = result.error().cloned().unwrap();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().starts_with("Error: Together"));
        assert!(err.message().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_query_provider_error_in_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "Model is overloaded", "code": 503}
            })))
            .mount(&server)
            .await;

        let h = handler("openrouter");
        let cfg = config("openrouter", "m").with_base_url(server.uri());
        let err = h.query(&[Message::user("q")], &cfg).await.into_completion().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn test_query_missing_key_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = handler("kimi");
        let cfg = QueryConfig::new("kimi", "kimi-k2").with_base_url(server.uri());
        let result = h.query(&[Message::user("q")], &cfg).await;
        assert_eq!(result.error().map(|e| e.kind()), Some(ErrorKind::Config));
    }

    #[tokio::test]
    async fn test_query_streaming() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"thinking\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let h = handler("deepseek");
        let cfg = config("deepseek", "deepseek-reasoner")
            .with_base_url(server.uri())
            .with_streaming(true);
        let QueryResult::Streaming(stream) = h.query(&[Message::user("q")], &cfg).await else {
            panic!("expected a stream");
        };
        let completion = stream.collect().await.unwrap();
        assert_eq!(completion.text, "Hello world");
        assert_eq!(completion.reasoning.as_deref(), Some("thinking"));
    }

    #[tokio::test]
    async fn test_query_deferred() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "deferred answer"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = handler("zai");
        let mut cfg = config("zai", "glm-4.6").with_base_url(server.uri());
        cfg.features.background_requests = true;
        let QueryResult::Deferred(deferred) = h.query(&[Message::user("q")], &cfg).await else {
            panic!("expected a deferred request");
        };
        assert_eq!(deferred.envelope().provider, "zai");
        assert_eq!(deferred.resolve().await.unwrap().text, "deferred answer");
    }

    #[tokio::test]
    async fn test_query_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
            .mount(&server)
            .await;

        let h = handler("doubao");
        let cfg = config("doubao", "doubao-seed-1-6").with_base_url(server.uri());
        let result = h.query(&[Message::user("q")], &cfg).await;
        assert_eq!(result.error().map(|e| e.kind()), Some(ErrorKind::Parse));
    }
}
