//! Response translation into the OpenAI wire format.
//!
//! Single-shot results become one `chat.completion` object. Streams become an
//! SSE body: a role frame, one frame per fragment, a terminal frame with the
//! finish reason, then `data: [DONE]`. A failure after the first frame is
//! reported in-band as an error frame followed by `[DONE]`.

use std::convert::Infallible;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::backend::{Generation, GenerationStream, StreamEvent, Usage};
use crate::config::Pricing;
use crate::proxy::types::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ChunkChoice, CompletionUsage, Delta,
    Message,
};
use crate::router::request_cost_usd;

/// End-of-stream sentinel frame.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

const ASSISTANT_ROLE: &str = "assistant";
const DEFAULT_FINISH_REASON: &str = "stop";

/// Identity shared by every object of one response.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub id: String,
    pub created: i64,
    /// The model identifier the client requested.
    pub model: String,
    /// Id of the provider that served the request.
    pub provider: String,
}

impl ResponseContext {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            provider: provider.into(),
        }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }

    pub fn role_frame(&self) -> Bytes {
        sse_frame(&self.chunk(
            Delta {
                role: Some(ASSISTANT_ROLE.to_string()),
                content: None,
            },
            None,
        ))
    }

    pub fn content_frame(&self, text: String) -> Bytes {
        sse_frame(&self.chunk(
            Delta {
                role: None,
                content: Some(text),
            },
            None,
        ))
    }

    pub fn finish_frame(&self, finish_reason: String, usage: Option<Usage>) -> Bytes {
        let mut chunk = self.chunk(Delta::default(), Some(finish_reason));
        chunk.usage = usage.map(CompletionUsage::from);
        sse_frame(&chunk)
    }

    pub fn error_frame(&self, message: &str) -> Bytes {
        sse_frame(&serde_json::json!({
            "id": self.id,
            "error": {
                "message": message,
                "type": "upstream_error",
            }
        }))
    }
}

fn sse_frame<T: Serialize>(payload: &T) -> Bytes {
    let json = serde_json::to_string(payload).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize stream frame");
        r#"{"error":{"message":"failed to serialize frame","type":"internal_error"}}"#.to_string()
    });
    Bytes::from(format!("data: {}\n\n", json))
}

/// Build a completion object with one choice per generation, in order.
///
/// Usage is the sum over all generations.
pub fn completion_response(
    ctx: &ResponseContext,
    generations: Vec<Generation>,
) -> ChatCompletionResponse {
    let usage: Usage = generations.iter().map(|g| g.usage).sum();

    let choices = generations
        .into_iter()
        .enumerate()
        .map(|(index, generation)| Choice {
            index: index as u32,
            message: Message {
                role: ASSISTANT_ROLE.to_string(),
                content: generation.text,
            },
            finish_reason: Some(generation.finish_reason),
        })
        .collect();

    ChatCompletionResponse {
        id: ctx.id.clone(),
        object: "chat.completion".to_string(),
        created: ctx.created,
        model: ctx.model.clone(),
        choices,
        usage: usage.into(),
        modelmux_provider: Some(ctx.provider.clone()),
    }
}

/// Encode a backend stream as SSE frames.
///
/// The returned stream pulls from `upstream` only as fast as it is polled, and
/// dropping it drops `upstream`, cancelling the generation.
pub fn sse_stream(
    ctx: ResponseContext,
    mut upstream: GenerationStream,
    pricing: Option<Pricing>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        yield Ok(ctx.role_frame());

        let mut finished = false;
        while !finished {
            match upstream.next().await {
                Some(Ok(StreamEvent::Delta(text))) => {
                    yield Ok(ctx.content_frame(text));
                }
                Some(Ok(StreamEvent::Finished { finish_reason, usage })) => {
                    tracing::info!(
                        provider = %ctx.provider,
                        id = %ctx.id,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        cost_usd = ?request_cost_usd(pricing.as_ref(), usage),
                        finish_reason = %finish_reason,
                        "Stream completed"
                    );
                    let reported = (usage != Usage::default()).then_some(usage);
                    yield Ok(ctx.finish_frame(finish_reason, reported));
                    finished = true;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        provider = %ctx.provider,
                        id = %ctx.id,
                        error = %e,
                        "Backend failed mid-stream"
                    );
                    yield Ok(ctx.error_frame(&e.to_string()));
                    finished = true;
                }
                None => {
                    tracing::debug!(id = %ctx.id, "Backend stream ended without finish event");
                    yield Ok(ctx.finish_frame(DEFAULT_FINISH_REASON.to_string(), None));
                    finished = true;
                }
            }
        }

        yield Ok(Bytes::from_static(DONE_FRAME));
    }
}
