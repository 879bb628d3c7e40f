//! HTTP request handlers.

use std::collections::HashSet;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use super::execute::{execute, ExecutionOptions, ExecutionResult};
use super::server::{AppState, RequestId};
use super::translate::{completion_response, sse_stream, ResponseContext};
use super::types::{ChatCompletionRequest, ModelEntry, ModelList};
use crate::backend::Usage;
use crate::error::Error;
use crate::router::{is_zero_cost, request_cost_usd};

/// Response header: correlation ID (UUID v4).
pub const MODELMUX_REQUEST_ID_HEADER: &str = "x-modelmux-request-id";
/// Response header: computed cost in USD (e.g. "0.000420").
pub const MODELMUX_COST_USD_HEADER: &str = "x-modelmux-cost-usd";
/// Response header: wall-clock latency in milliseconds (integer).
pub const MODELMUX_LATENCY_MS_HEADER: &str = "x-modelmux-latency-ms";
/// Response header: id of the provider that handled the request.
pub const MODELMUX_PROVIDER_HEADER: &str = "x-modelmux-provider";
/// Response header: present with value "true" on streaming responses.
pub const MODELMUX_STREAMING_HEADER: &str = "x-modelmux-streaming";

/// Outcome of a successful request.
struct RequestOutcome {
    response: Response,
    provider: String,
    cost_usd: Option<f64>,
}

/// A failed request, with the provider when one had already been selected.
struct RequestError {
    error: Error,
    provider: Option<String>,
}

impl From<Error> for RequestError {
    fn from(error: Error) -> Self {
        Self {
            error,
            provider: None,
        }
    }
}

/// Attach modelmux metadata headers to a response.
///
/// Streaming responses carry the streaming flag instead of latency and cost,
/// neither of which is known when headers are sent.
fn attach_modelmux_headers(
    response: &mut Response,
    latency_ms: u64,
    provider: Option<&str>,
    cost_usd: Option<f64>,
    is_streaming: bool,
) {
    let headers = response.headers_mut();

    if is_streaming {
        headers.insert(
            HeaderName::from_static(MODELMUX_STREAMING_HEADER),
            HeaderValue::from_static("true"),
        );
    } else {
        headers.insert(
            HeaderName::from_static(MODELMUX_LATENCY_MS_HEADER),
            HeaderValue::from(latency_ms),
        );
        if let Some(value) = cost_usd.and_then(|c| HeaderValue::from_str(&format!("{:.6}", c)).ok())
        {
            headers.insert(HeaderName::from_static(MODELMUX_COST_USD_HEADER), value);
        }
    }

    if let Some(value) = provider.and_then(|p| HeaderValue::from_str(p).ok()) {
        headers.insert(HeaderName::from_static(MODELMUX_PROVIDER_HEADER), value);
    }
}

/// Handle POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let start = Instant::now();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return Error::BadRequest(rejection.body_text()).into_response(),
    };
    let options = ExecutionOptions::new(request.stream.unwrap_or(false), request.n);

    tracing::info!(
        request_id = %request_id.0,
        model = %request.model,
        stream = options.stream,
        n = options.choice_count,
        "Received chat completion request"
    );

    let result = execute_request(&state, &request, options).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            let mut response = outcome.response;
            attach_modelmux_headers(
                &mut response,
                latency_ms,
                Some(&outcome.provider),
                outcome.cost_usd,
                options.stream,
            );
            response
        }
        Err(failure) => {
            tracing::warn!(
                request_id = %request_id.0,
                model = %request.model,
                provider = ?failure.provider,
                error = %failure.error,
                "Chat completion failed"
            );
            let mut response = failure.error.into_response();
            // Errors are never streamed, so they carry latency.
            attach_modelmux_headers(
                &mut response,
                latency_ms,
                failure.provider.as_deref(),
                None,
                false,
            );
            response
        }
    }
}

/// Route, obtain a backend handle, execute and translate.
async fn execute_request(
    state: &AppState,
    request: &ChatCompletionRequest,
    options: ExecutionOptions,
) -> Result<RequestOutcome, RequestError> {
    let route = state.router.route(&request.model)?;
    let provider = route.provider.id.clone();
    let with_provider = |error: Error| RequestError {
        error,
        provider: Some(provider.clone()),
    };

    let backend = state
        .backends
        .get_or_create(&route.provider, route.generation)
        .await
        .map_err(with_provider)?;

    let result = execute(
        backend.as_ref(),
        &route.model.canonical_slug,
        &request.messages,
        options,
        state.request_timeout,
    )
    .await
    .map_err(with_provider)?;

    let ctx = ResponseContext::new(request.model.as_str(), provider.as_str());

    match result {
        ExecutionResult::Completions(generations) => {
            let usage: Usage = generations.iter().map(|g| g.usage).sum();
            let cost_usd = request_cost_usd(route.model.pricing.as_ref(), usage);

            tracing::info!(
                provider = %provider,
                id = %ctx.id,
                choices = generations.len(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost_usd = ?cost_usd,
                "Completion served"
            );

            let body = completion_response(&ctx, generations);
            Ok(RequestOutcome {
                response: Json(body).into_response(),
                provider,
                cost_usd,
            })
        }
        ExecutionResult::Stream(upstream) => {
            let frames = sse_stream(ctx, upstream, route.model.pricing.clone());
            let response = (
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from_stream(frames),
            )
                .into_response();

            Ok(RequestOutcome {
                response,
                provider,
                cost_usd: None,
            })
        }
    }
}

/// Handle GET /v1/models - every distinct exposed model across all providers
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let snapshot = state.catalog.providers();
    let created = chrono::Utc::now().timestamp();
    let mut seen = HashSet::new();
    let mut data = Vec::new();

    for provider in snapshot.iter() {
        for model in &provider.models {
            if seen.insert(model.exposed_id()) {
                data.push(ModelEntry {
                    id: model.exposed_id().to_string(),
                    object: "model".to_string(),
                    created,
                    owned_by: provider.id.clone(),
                });
            }
        }
    }

    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "modelmux",
        "providers": state.catalog.providers().len(),
        "cached_backends": state.backends.len(),
    }))
}

/// Handle GET /providers - modelmux extension to list providers
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .catalog
        .providers()
        .iter()
        .map(|p| {
            let models: Vec<serde_json::Value> = p
                .models
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.exposed_id(),
                        "canonical_slug": m.canonical_slug,
                        "display_name": m.display_name,
                        "pricing": m.pricing,
                        "zero_cost": is_zero_cost(m.pricing.as_ref()),
                    })
                })
                .collect();

            serde_json::json!({
                "id": p.id,
                "type": p.provider_type,
                "base_url": p.base_url,
                "models": models,
            })
        })
        .collect();

    Json(serde_json::json!({
        "providers": providers
    }))
}
