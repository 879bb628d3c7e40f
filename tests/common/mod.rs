//! Shared helpers for the gateway integration tests.
//!
//! Providers of type `fake` are served by [`FakeFactory`], whose backends
//! replay a fixed script instead of calling a real model.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures::{stream, StreamExt};
use http::{HeaderMap, Request, StatusCode};
use tower::ServiceExt;

use modelmux::backend::{
    Backend, BackendError, BackendFactory, BackendHandle, BackendRegistry, Generation,
    GenerationStream, StreamEvent, Usage,
};
use modelmux::config::{
    Config, ExecutionConfig, ModelConfig, Pricing, ProviderConfig, ServerConfig,
};
use modelmux::proxy::{create_router, AppState, Message};

pub const FAKE_TYPE: &str = "fake";

/// What every fake backend built by one factory does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with these fragments (joined for single-shot calls).
    Reply(Vec<&'static str>),
    /// Fail before producing anything.
    Fail(&'static str),
    /// Stream these fragments, then fail. Single-shot calls fail outright.
    FailMidStream(Vec<&'static str>, &'static str),
}

/// Counts constructions and generation calls across all built backends.
#[derive(Debug, Default)]
pub struct Counters {
    pub builds: AtomicUsize,
    pub calls: AtomicUsize,
    /// API key each construction was handed, in build order.
    pub keys: Mutex<Vec<String>>,
}

impl Counters {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

pub struct FakeFactory {
    pub script: Script,
    pub counters: Arc<Counters>,
}

#[async_trait]
impl BackendFactory for FakeFactory {
    async fn build(&self, provider: &ProviderConfig) -> Result<BackendHandle, BackendError> {
        self.counters.builds.fetch_add(1, Ordering::SeqCst);
        self.counters.keys.lock().unwrap().push(
            provider
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_default(),
        );
        Ok(Arc::new(FakeBackend {
            provider: provider.id.clone(),
            script: self.script.clone(),
            counters: self.counters.clone(),
        }))
    }
}

pub struct FakeBackend {
    provider: String,
    script: Script,
    counters: Arc<Counters>,
}

fn usage_for(fragments: &[&str]) -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: fragments.len() as u32,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn generate(&self, model: &str, _messages: &[Message]) -> Result<Generation, BackendError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(fragments) => Ok(Generation {
                text: format!("[{}:{}] {}", self.provider, model, fragments.concat()),
                finish_reason: "stop".to_string(),
                usage: usage_for(fragments),
            }),
            Script::Fail(message) | Script::FailMidStream(_, message) => {
                Err(BackendError::Provider(message.to_string()))
            }
        }
    }

    async fn generate_stream(
        &self,
        _model: &str,
        _messages: &[Message],
    ) -> Result<GenerationStream, BackendError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let events: Vec<Result<StreamEvent, BackendError>> = match &self.script {
            Script::Reply(fragments) => fragments
                .iter()
                .map(|f| Ok(StreamEvent::Delta(f.to_string())))
                .chain(std::iter::once(Ok(StreamEvent::Finished {
                    finish_reason: "stop".to_string(),
                    usage: usage_for(fragments),
                })))
                .collect(),
            Script::Fail(message) => return Err(BackendError::Provider(message.to_string())),
            Script::FailMidStream(fragments, message) => fragments
                .iter()
                .map(|f| Ok(StreamEvent::Delta(f.to_string())))
                .chain(std::iter::once(Err(BackendError::Provider(
                    message.to_string(),
                ))))
                .collect(),
        };
        Ok(stream::iter(events).boxed())
    }
}

pub fn pricing(input: Option<f64>, output: Option<f64>) -> Option<Pricing> {
    Some(Pricing {
        input_cost_per_million_tokens: input,
        output_cost_per_million_tokens: output,
        cost_per_request: None,
    })
}

pub fn model(canonical: &str, exposed: Option<&str>, pricing: Option<Pricing>) -> ModelConfig {
    ModelConfig {
        canonical_slug: canonical.to_string(),
        exposed_slug: exposed.map(str::to_string),
        display_name: None,
        pricing,
    }
}

pub fn provider(id: &str, models: Vec<ModelConfig>) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        provider_type: FAKE_TYPE.to_string(),
        api_key: Some("sk-test-secret".into()),
        base_url: None,
        models,
    }
}

pub fn config(providers: Vec<ProviderConfig>) -> Config {
    Config {
        server: ServerConfig {
            listen: "127.0.0.1:0".to_string(),
        },
        execution: ExecutionConfig::default(),
        providers,
        logging: Default::default(),
    }
}

/// Build the gateway over `providers`, with every `fake` backend following `script`.
pub fn setup_app(
    providers: Vec<ProviderConfig>,
    script: Script,
) -> (axum::Router, AppState, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let mut registry = BackendRegistry::new();
    registry.register(
        FAKE_TYPE,
        FakeFactory {
            script,
            counters: counters.clone(),
        },
    );

    let state = AppState::new(&config(providers), registry);
    (create_router(state.clone()), state, counters)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).expect("response body should be UTF-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Payloads of every `data:` line of an SSE body.
    pub fn sse_payloads(&self) -> Vec<String> {
        self.text()
            .split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| {
                frame
                    .strip_prefix("data: ")
                    .unwrap_or_else(|| panic!("not an SSE data frame: {:?}", frame))
                    .to_string()
            })
            .collect()
    }
}

pub async fn send(app: axum::Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: axum::Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_chat(app: axum::Router, body: serde_json::Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub fn chat_body(model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}]
    })
}
