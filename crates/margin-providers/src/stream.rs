//! Streaming delivery — SSE decoding per provider dialect and the caller-side
//! [`StreamHandle`].
//!
//! A producer task reads the HTTP body through `eventsource-stream`, decodes
//! each event with the dialect's rules, and pushes chunks into a bounded
//! channel. The handle drains that channel in order. Dropping the handle closes
//! the channel and aborts the producer.

use std::fmt;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use margin_core::error::{PipelineError, PipelineResult};
use margin_core::types::Completion;

use crate::reasoning::{merge_reasoning, split_think_tags};
use crate::response::{
    explicit_reasoning, flatten_content_parts, gemini_block_reason, gemini_candidate_parts,
    provider_error_message, top_level_error, BLOCKING_FINISH_REASONS,
};
use crate::transport::ErrorEnhancer;

/// Chunks buffered between producer and consumer.
pub(crate) const STREAM_CHANNEL_CAPACITY: usize = 64;

const OPENAI_DONE: &str = "[DONE]";

/// SSE framing rules of a provider family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamDialect {
    /// `choices[0].delta` events terminated by `data: [DONE]`.
    OpenAi,
    /// Full `GenerateContentResponse` per event; end of body completes.
    Gemini,
}

/// One incremental piece of a streamed answer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Reasoning(String),
}

/// Where a [`StreamHandle`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Completed,
    Failed,
}

/// Message from the producer task to the handle.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Chunk(StreamChunk),
    Completed,
    Failed(PipelineError),
}

// ─────────────────────────────────────────────
// StreamHandle
// ─────────────────────────────────────────────

/// Caller side of a streamed response.
///
/// Chunks are yielded raw; think-tag separation happens in [`StreamHandle::collect`].
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    producer: Option<JoinHandle<()>>,
    state: StreamState,
    text: String,
    reasoning: String,
    extract_reasoning: bool,
    enhance: ErrorEnhancer,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state)
            .field("received", &self.text.len())
            .finish()
    }
}

impl StreamHandle {
    pub(crate) fn new(
        events: mpsc::Receiver<StreamEvent>,
        producer: JoinHandle<()>,
        extract_reasoning: bool,
        enhance: ErrorEnhancer,
    ) -> Self {
        StreamHandle {
            events,
            producer: Some(producer),
            state: StreamState::Streaming,
            text: String::new(),
            reasoning: String::new(),
            extract_reasoning,
            enhance,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Answer text received so far.
    pub fn partial_text(&self) -> &str {
        &self.text
    }

    /// Next chunk in order; `None` once the stream completed or failed.
    pub async fn next_chunk(&mut self) -> Option<PipelineResult<StreamChunk>> {
        if self.state != StreamState::Streaming {
            return None;
        }
        match self.events.recv().await {
            Some(StreamEvent::Chunk(chunk)) => {
                match &chunk {
                    StreamChunk::Text(t) => self.text.push_str(t),
                    StreamChunk::Reasoning(r) => self.reasoning.push_str(r),
                }
                Some(Ok(chunk))
            }
            Some(StreamEvent::Completed) => {
                self.state = StreamState::Completed;
                None
            }
            Some(StreamEvent::Failed(err)) => Some(Err(self.fail(err))),
            None => Some(Err(self.fail(PipelineError::stream(
                "Stream closed unexpectedly",
                "",
            )))),
        }
    }

    /// Drain the stream into a single [`Completion`].
    pub async fn collect(mut self) -> PipelineResult<Completion> {
        while let Some(next) = self.next_chunk().await {
            next?;
        }

        let text = std::mem::take(&mut self.text);
        let explicit = Some(std::mem::take(&mut self.reasoning)).filter(|r| !r.trim().is_empty());
        if !self.extract_reasoning {
            return Ok(Completion::text(text));
        }
        let (answer, inline) = split_think_tags(&text);
        Ok(Completion {
            text: answer,
            reasoning: merge_reasoning(explicit, inline),
        })
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.state = StreamState::Failed;
        let err = match err {
            PipelineError::Stream { message, .. } => {
                PipelineError::stream(message, self.text.clone())
            }
            other => other,
        };
        (self.enhance)(err)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

// ─────────────────────────────────────────────
// SSE decoding
// ─────────────────────────────────────────────

/// Outcome of decoding one SSE `data:` payload.
#[derive(Debug, PartialEq)]
pub(crate) enum Decoded {
    Chunks(Vec<StreamChunk>),
    Done,
    Failed(String),
}

/// Per-stream decoder state.
pub(crate) struct SseDecoder {
    dialect: StreamDialect,
    extract_reasoning: bool,
    label: String,
    saw_finish: bool,
    saw_text: bool,
}

impl SseDecoder {
    pub(crate) fn new(dialect: StreamDialect, extract_reasoning: bool, label: &str) -> Self {
        SseDecoder {
            dialect,
            extract_reasoning,
            label: label.to_string(),
            saw_finish: false,
            saw_text: false,
        }
    }

    pub(crate) fn extract_reasoning(&self) -> bool {
        self.extract_reasoning
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn decode(&mut self, data: &str) -> Decoded {
        let data = data.trim();
        if data.is_empty() {
            return Decoded::Chunks(Vec::new());
        }
        if self.dialect == StreamDialect::OpenAi && data == OPENAI_DONE {
            return Decoded::Done;
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(provider = %self.label, error = %e, "Skipping undecodable stream event");
                return Decoded::Chunks(Vec::new());
            }
        };
        if let Some(error) = top_level_error(&payload) {
            return Decoded::Failed(format!(
                "{} stream error: {}",
                self.label,
                provider_error_message(error)
            ));
        }

        let decoded = match self.dialect {
            StreamDialect::OpenAi => self.decode_openai(&payload),
            StreamDialect::Gemini => self.decode_gemini(&payload),
        };
        if let Decoded::Chunks(chunks) = &decoded {
            if chunks.iter().any(|c| matches!(c, StreamChunk::Text(_))) {
                self.saw_text = true;
            }
        }
        decoded
    }

    fn decode_openai(&mut self, payload: &Value) -> Decoded {
        let Some(choice) = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            // Usage-only trailer.
            return Decoded::Chunks(Vec::new());
        };
        if choice.get("finish_reason").is_some_and(Value::is_string) {
            self.saw_finish = true;
        }

        let mut chunks = Vec::new();
        let Some(delta) = choice.get("delta") else {
            return Decoded::Chunks(chunks);
        };
        if self.extract_reasoning {
            if let Some(r) = explicit_reasoning(delta) {
                chunks.push(StreamChunk::Reasoning(r));
            }
        }
        match delta.get("content") {
            Some(Value::String(text)) if !text.is_empty() => {
                chunks.push(StreamChunk::Text(text.clone()));
            }
            // Mistral reasoning models stream content as typed parts.
            Some(Value::Array(parts)) => {
                let (text, thinking) = flatten_content_parts(parts);
                if let Some(thinking) = thinking.filter(|_| self.extract_reasoning) {
                    chunks.push(StreamChunk::Reasoning(thinking));
                }
                if !text.is_empty() {
                    chunks.push(StreamChunk::Text(text));
                }
            }
            _ => {}
        }
        Decoded::Chunks(chunks)
    }

    fn decode_gemini(&mut self, payload: &Value) -> Decoded {
        if let Some(reason) = gemini_block_reason(payload) {
            return Decoded::Failed(format!("Gemini blocked the prompt ({reason})"));
        }
        let Some(candidate) = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return Decoded::Chunks(Vec::new());
        };

        let (text, thoughts) = gemini_candidate_parts(candidate);
        let finish = candidate.get("finishReason").and_then(Value::as_str);
        if let Some(reason) = finish.filter(|r| BLOCKING_FINISH_REASONS.contains(r)) {
            if text.is_empty() && !self.saw_text {
                return Decoded::Failed(format!("Gemini withheld the response ({reason})"));
            }
        }

        let mut chunks = Vec::new();
        if self.extract_reasoning && !thoughts.is_empty() {
            chunks.push(StreamChunk::Reasoning(thoughts));
        }
        if !text.is_empty() {
            chunks.push(StreamChunk::Text(text));
        }
        Decoded::Chunks(chunks)
    }

    /// Outcome when the body ends without an explicit terminator.
    pub(crate) fn finish(&self) -> StreamEvent {
        match self.dialect {
            StreamDialect::Gemini => StreamEvent::Completed,
            StreamDialect::OpenAi if self.saw_finish => StreamEvent::Completed,
            StreamDialect::OpenAi => StreamEvent::Failed(PipelineError::stream(
                format!("{} stream ended before completion", self.label),
                "",
            )),
        }
    }
}

// ─────────────────────────────────────────────
// Producer
// ─────────────────────────────────────────────

/// Read SSE events from `bytes` until completion, failure, or a dropped receiver.
pub(crate) async fn pump_events<S, B, E>(
    bytes: S,
    mut decoder: SseDecoder,
    idle_timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut events = Box::pin(bytes.eventsource());
    loop {
        let next = match tokio::time::timeout(idle_timeout, events.next()).await {
            Ok(next) => next,
            Err(_) => {
                let err = PipelineError::stream(
                    format!(
                        "{} stream stalled: no data for {}s",
                        decoder.label,
                        idle_timeout.as_secs()
                    ),
                    "",
                );
                let _ = tx.send(StreamEvent::Failed(err)).await;
                return;
            }
        };

        let outcome = match next {
            None => decoder.finish(),
            Some(Err(e)) => StreamEvent::Failed(PipelineError::stream(
                format!("{} stream interrupted: {e}", decoder.label),
                "",
            )),
            Some(Ok(event)) => match decoder.decode(&event.data) {
                Decoded::Chunks(chunks) => {
                    for chunk in chunks {
                        if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                            debug!(provider = %decoder.label, "Stream receiver dropped");
                            return;
                        }
                    }
                    continue;
                }
                Decoded::Done => StreamEvent::Completed,
                Decoded::Failed(message) => StreamEvent::Failed(PipelineError::stream(message, "")),
            },
        };
        let _ = tx.send(outcome).await;
        return;
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
