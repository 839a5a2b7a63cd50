//! HTTP transport shared by every handler.
//!
//! One `reqwest::Client` (connection-pooled) carries both dispatch branches:
//! one-shot requests resolve to a single [`RawResponse`], streamed requests
//! feed a [`StreamHandle`]. Status normalization lives in
//! [`handle_api_response`] so provider parsers only ever see 2xx bodies.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use margin_core::config::TransportSettings;
use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::Completion;
use margin_core::utils::truncate_string;

use crate::request::RequestEnvelope;
use crate::response::{decode_payload, provider_error_message, top_level_error, ResponseParser};
use crate::stream::{pump_events, SseDecoder, StreamEvent, StreamHandle, STREAM_CHANNEL_CAPACITY};

/// Rewrites an error's text for the caller, keeping its classification.
pub type ErrorEnhancer = Arc<dyn Fn(PipelineError) -> PipelineError + Send + Sync>;

/// An enhancer that leaves errors untouched.
pub fn identity_enhancer() -> ErrorEnhancer {
    Arc::new(|e: PipelineError| e)
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────

/// Shared HTTP client plus timeouts.
#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl Transport {
    pub fn new(settings: &TransportSettings) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Transport {
            client,
            request_timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
            stream_idle_timeout: Duration::from_secs(settings.stream_idle_timeout_secs.max(1)),
        })
    }

    pub fn with_defaults() -> PipelineResult<Self> {
        Self::new(&TransportSettings::default())
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout
    }

    fn post(&self, envelope: &RequestEnvelope) -> reqwest::RequestBuilder {
        let mut request = self.client.post(&envelope.url);
        for (name, value) in &envelope.headers {
            request = request.header(name, value);
        }
        request.body(envelope.body_bytes())
    }

    fn describe(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!("request timed out after {}s", self.request_timeout.as_secs())
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            e.to_string()
        }
    }

    /// Execute a one-shot request and read the whole body.
    pub async fn send(&self, envelope: &RequestEnvelope) -> RawResponse {
        let started = Instant::now();
        let result = self
            .post(envelope)
            .timeout(self.request_timeout)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!(provider = %envelope.provider, error = %e, "HTTP request failed");
                return RawResponse::failed(None, self.describe(&e));
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                debug!(
                    provider = %envelope.provider,
                    status,
                    bytes = body.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Response received"
                );
                RawResponse {
                    succeeded: true,
                    status: Some(status),
                    chunks: vec![body],
                }
            }
            Err(e) => {
                error!(
                    provider = %envelope.provider,
                    status,
                    error = %e,
                    "Failed to read response body"
                );
                RawResponse::failed(Some(status), self.describe(&e))
            }
        }
    }

    /// Start the exchange without blocking the caller.
    ///
    /// The branch is decided by `envelope.streaming`. Dropping the returned
    /// handle cancels the exchange.
    pub fn background_request(
        &self,
        envelope: RequestEnvelope,
        parser: ResponseParser,
        label: &str,
        enhance: ErrorEnhancer,
    ) -> BackgroundHandle {
        if !envelope.streaming {
            let transport = self.clone();
            let task = tokio::spawn(async move { transport.send(&envelope).await });
            return BackgroundHandle::Pending(PendingResponse { task });
        }

        let decoder = SseDecoder::new(parser.dialect(), parser.extract_reasoning(), label);
        let extract_reasoning = decoder.extract_reasoning();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let producer = tokio::spawn(self.clone().dispatch_stream(envelope, decoder, tx));
        BackgroundHandle::Streaming(StreamHandle::new(rx, producer, extract_reasoning, enhance))
    }

    async fn dispatch_stream(
        self,
        envelope: RequestEnvelope,
        decoder: SseDecoder,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let label = decoder.label().to_string();
        let sent = tokio::time::timeout(self.request_timeout, self.post(&envelope).send()).await;
        let response = match sent {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!(provider = %envelope.provider, error = %e, "Stream request failed");
                let err = network_failure(None, &self.describe(&e), &label);
                let _ = tx.send(StreamEvent::Failed(err)).await;
                return;
            }
            Err(_) => {
                let detail = format!(
                    "no response within {}s",
                    self.request_timeout.as_secs()
                );
                let _ = tx
                    .send(StreamEvent::Failed(network_failure(None, &detail, &label)))
                    .await;
                return;
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Err(err) = handle_api_response(true, Some(status), &[body], &label) {
                warn!(provider = %envelope.provider, status, "Stream rejected");
                let _ = tx.send(StreamEvent::Failed(err)).await;
            }
            return;
        }

        debug!(provider = %envelope.provider, status, "Stream opened");
        pump_events(response.bytes_stream(), decoder, self.stream_idle_timeout, tx).await;
    }
}

// ─────────────────────────────────────────────
// Raw responses
// ─────────────────────────────────────────────

/// What came back from the wire, before any interpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    /// False when the connection itself failed.
    pub succeeded: bool,
    pub status: Option<u16>,
    /// Body pieces, or the failure description when `succeeded` is false.
    pub chunks: Vec<String>,
}

impl RawResponse {
    fn failed(status: Option<u16>, detail: String) -> Self {
        RawResponse {
            succeeded: false,
            status,
            chunks: vec![detail],
        }
    }
}

fn network_failure(status: Option<u16>, detail: &str, label: &str) -> PipelineError {
    PipelineError::network(status, format!("{label} request failed: {detail}"))
}

/// The most useful message in an error body.
fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return truncate_string(trimmed, 300);
    };
    // Gemini occasionally wraps the error object in a one-element array.
    let json = match json {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    if let Some(error) = top_level_error(&json) {
        return provider_error_message(error);
    }
    for key in ["message", "detail", "msg"] {
        if let Some(msg) = json.get(key).and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    truncate_string(trimmed, 300)
}

/// Normalize a finished exchange into the body text or a `NetworkError`.
///
/// Connection failures and non-2xx statuses are rejected before any
/// provider-specific parsing; a JSON error body contributes its `message`.
pub fn handle_api_response(
    succeeded: bool,
    status: Option<u16>,
    chunks: &[String],
    label: &str,
) -> PipelineResult<String> {
    let body = chunks.concat();
    if !succeeded {
        return Err(network_failure(status, &body, label));
    }
    match status {
        Some(code) if (200..300).contains(&code) => Ok(body),
        Some(code) => Err(PipelineError::network(
            Some(code),
            format!("{label} API error (HTTP {code}): {}", error_detail(&body)),
        )),
        None => Err(network_failure(None, "no HTTP status", label)),
    }
}

/// Status check, JSON decode, then provider parse.
pub fn finish_one_shot(
    raw: RawResponse,
    parser: &ResponseParser,
    label: &str,
) -> PipelineResult<Completion> {
    let body = handle_api_response(raw.succeeded, raw.status, &raw.chunks, label)?;
    let payload = decode_payload(&body, label)?;
    parser.parse(&payload)
}

// ─────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────

/// A one-shot exchange running on the runtime. Aborted when dropped.
#[derive(Debug)]
pub struct PendingResponse {
    task: JoinHandle<RawResponse>,
}

impl PendingResponse {
    pub async fn wait(mut self) -> RawResponse {
        match (&mut self.task).await {
            Ok(raw) => raw,
            Err(e) => RawResponse::failed(None, format!("request task ended: {e}")),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Result of [`Transport::background_request`].
#[derive(Debug)]
pub enum BackgroundHandle {
    Streaming(StreamHandle),
    Pending(PendingResponse),
}

/// A one-shot request returned unexecuted, with the parser to apply once it
/// resolves. The caller decides when (and whether) to run it.
pub struct DeferredRequest {
    transport: Transport,
    envelope: RequestEnvelope,
    parser: ResponseParser,
    label: String,
    enhance: ErrorEnhancer,
}

impl fmt::Debug for DeferredRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredRequest")
            .field("provider", &self.envelope.provider)
            .field("url", &self.envelope.url)
            .field("parser", &self.parser.key())
            .finish()
    }
}

impl DeferredRequest {
    pub(crate) fn new(
        transport: Transport,
        envelope: RequestEnvelope,
        parser: ResponseParser,
        label: &str,
        enhance: ErrorEnhancer,
    ) -> Self {
        DeferredRequest {
            transport,
            envelope,
            parser,
            label: label.to_string(),
            enhance,
        }
    }

    pub fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    pub fn parser(&self) -> ResponseParser {
        self.parser
    }

    /// Execute the request and parse the answer.
    pub async fn resolve(self) -> PipelineResult<Completion> {
        let raw = self.transport.send(&self.envelope).await;
        finish_one_shot(raw, &self.parser, &self.label).map_err(|e| (self.enhance)(e))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
