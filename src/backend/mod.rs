//! Backend capability interface.
//!
//! Every provider type is consumed through the same two capabilities:
//! a single-shot generation and a stream of text fragments that resolves
//! to a finish reason and token usage. Concrete clients are built by the
//! [`registry`] and memoized per provider by the [`cache`].

pub mod cache;
pub mod openai;
pub mod registry;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::proxy::types::Message;

pub use cache::BackendCache;
pub use registry::{BackendFactory, BackendRegistry};

/// Token counts reported for one backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    /// Saturates at `u32::MAX` instead of wrapping on misreported counts.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
        }
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Usage {
        iter.fold(Usage::default(), |acc, u| acc + u)
    }
}

/// Result of a single-shot generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub finish_reason: String,
    pub usage: Usage,
}

/// One item of a streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text fragment, in backend emission order.
    Delta(String),
    /// End of generation. Always the last item of a successful stream.
    Finished { finish_reason: String, usage: Usage },
}

/// A lazy, non-restartable sequence of stream events.
///
/// Dropping it cancels the upstream generation.
pub type GenerationStream = BoxStream<'static, Result<StreamEvent, BackendError>>;

/// Errors raised by backend clients.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("invalid backend configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Provider(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
}

/// A callable client bound to one provider instance.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate one complete answer.
    async fn generate(&self, model: &str, messages: &[Message]) -> Result<Generation, BackendError>;

    /// Start a streamed generation.
    ///
    /// Errors returned here happen before any fragment was produced.
    async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<GenerationStream, BackendError>;
}

/// Shared handle to a constructed backend.
pub type BackendHandle = Arc<dyn Backend>;
