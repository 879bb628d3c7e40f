//! OpenAI-compatible chat completions backend.
//!
//! Covers every provider that speaks `POST {base_url}/chat/completions`
//! (OpenAI, OpenRouter, Groq, Together, DeepSeek, Ollama, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use super::sse::{SseData, SseDecoder};
use super::{
    Backend, BackendError, BackendFactory, BackendHandle, Generation, GenerationStream,
    StreamEvent, Usage,
};
use crate::config::{ApiKey, ProviderConfig};
use crate::proxy::types::Message;

/// Provider type tags served by this backend, with their default base URL.
pub const OPENAI_COMPATIBLE_TYPES: &[(&str, Option<&str>)] = &[
    ("openai", Some("https://api.openai.com/v1")),
    ("openrouter", Some("https://openrouter.ai/api/v1")),
    ("groq", Some("https://api.groq.com/openai/v1")),
    ("together", Some("https://api.together.xyz/v1")),
    ("deepseek", Some("https://api.deepseek.com/v1")),
    ("ollama", Some("http://localhost:11434/v1")),
    ("openai-compatible", None),
];

const DEFAULT_FINISH_REASON: &str = "stop";

/// Builds [`OpenAiBackend`] clients for one provider type.
pub struct OpenAiFactory {
    default_base_url: Option<&'static str>,
    connect_timeout: Duration,
}

impl OpenAiFactory {
    pub fn new(default_base_url: Option<&'static str>, connect_timeout: Duration) -> Self {
        Self {
            default_base_url,
            connect_timeout,
        }
    }
}

#[async_trait]
impl BackendFactory for OpenAiFactory {
    async fn build(&self, provider: &ProviderConfig) -> Result<BackendHandle, BackendError> {
        let base_url = provider
            .base_url
            .as_deref()
            .or(self.default_base_url)
            .ok_or_else(|| {
                BackendError::Config(format!(
                    "provider '{}' of type '{}' requires a base_url",
                    provider.id, provider.provider_type
                ))
            })?;

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?;

        Ok(std::sync::Arc::new(OpenAiBackend::new(
            client,
            base_url,
            provider.api_key.clone(),
        )))
    }
}

/// Client for one OpenAI-compatible endpoint.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: Option<ApiKey>,
}

impl OpenAiBackend {
    pub fn new(client: Client, base_url: &str, api_key: Option<ApiKey>) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    async fn send(&self, body: &UpstreamRequest<'_>) -> Result<reqwest::Response, BackendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn generate(&self, model: &str, messages: &[Message]) -> Result<Generation, BackendError> {
        let body = UpstreamRequest {
            model,
            messages,
            stream: false,
            stream_options: None,
        };

        let response: UpstreamCompletion = self
            .send(&body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("response has no choices".to_string()))?;

        Ok(Generation {
            text: choice
                .message
                .and_then(|m| m.content)
                .unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
            usage: response.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<GenerationStream, BackendError> {
        let body = UpstreamRequest {
            model,
            messages,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        let response = self.send(&body).await?;
        Ok(decode_stream(response.bytes_stream()).boxed())
    }
}

/// Turn an SSE byte stream into stream events.
///
/// Ends with a `Finished` event at `[DONE]` or at end of body. Dropping the
/// returned stream drops `bytes`, which closes the upstream connection.
fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<StreamEvent, BackendError>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::new();
        let mut state = ChunkState::default();
        let mut done = false;

        while !done {
            let Some(chunk) = bytes.next().await else {
                break;
            };
            let chunk = chunk?;
            for data in decoder.push(&chunk) {
                match data {
                    SseData::Done => {
                        done = true;
                        break;
                    }
                    SseData::Payload(payload) => {
                        if let Some(text) = state.absorb(&payload) {
                            yield StreamEvent::Delta(text);
                        }
                    }
                }
            }
        }

        if !done {
            if let Some(SseData::Payload(payload)) = decoder.finish() {
                if let Some(text) = state.absorb(&payload) {
                    yield StreamEvent::Delta(text);
                }
            }
        }

        yield state.finished();
    }
}

/// Finish reason and usage accumulated while reading a stream.
#[derive(Default)]
struct ChunkState {
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl ChunkState {
    /// Record metadata from one chunk payload and return its text fragment, if any.
    fn absorb(&mut self, payload: &str) -> Option<String> {
        let chunk: UpstreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed stream chunk");
                return None;
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        let choice = chunk.choices.into_iter().next()?;
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        choice
            .delta
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty())
    }

    fn finished(self) -> StreamEvent {
        StreamEvent::Finished {
            finish_reason: self
                .finish_reason
                .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
            usage: self.usage.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

/// Asks the upstream to append a usage object to the final stream chunk.
#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct UpstreamCompletion {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    usage: Option<UpstreamUsage>,
}

#[derive(Deserialize)]
struct UpstreamChoice {
    message: Option<UpstreamContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChunkChoice>,
    usage: Option<UpstreamUsage>,
}

#[derive(Deserialize)]
struct UpstreamChunkChoice {
    delta: Option<UpstreamContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<UpstreamUsage> for Usage {
    fn from(u: UpstreamUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }
    }
}
