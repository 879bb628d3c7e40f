//! HTTP proxy server module.
//!
//! This module provides the OpenAI-compatible HTTP API that accepts
//! requests, runs them on the selected provider's backend and translates
//! the result back into the OpenAI wire format.

pub mod execute;
mod handlers;
mod server;
pub mod translate;
pub mod types;

pub use execute::{execute, ExecutionOptions, ExecutionResult};
pub use handlers::{
    MODELMUX_COST_USD_HEADER, MODELMUX_LATENCY_MS_HEADER, MODELMUX_PROVIDER_HEADER,
    MODELMUX_REQUEST_ID_HEADER, MODELMUX_STREAMING_HEADER,
};
pub use server::{create_router, run_server, AppState, RequestId};
pub use types::{ChatCompletionRequest, ChatCompletionResponse, Message};
