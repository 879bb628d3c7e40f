//! Execution adapter: drives one backend call per request.
//!
//! Non-streaming requests fan out into `n` concurrent generations and fail as
//! a whole if any of them fails. Streaming requests always produce exactly one
//! choice. Nothing is retried and no other candidate is tried.

use std::future::Future;
use std::time::Duration;

use futures::future::try_join_all;
use futures::{stream, StreamExt};

use crate::backend::{Backend, BackendError, Generation, GenerationStream};
use crate::error::{Error, Result};
use crate::proxy::types::Message;

/// How a request is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub stream: bool,
    pub choice_count: usize,
}

impl ExecutionOptions {
    /// Normalize client options: a missing or zero `n` means one choice,
    /// and streaming always uses one choice.
    pub fn new(stream: bool, n: Option<u32>) -> Self {
        let requested = n.unwrap_or(1).max(1) as usize;

        if stream && requested > 1 {
            tracing::debug!(requested, "Streaming supports one choice, ignoring n");
        }

        Self {
            stream,
            choice_count: if stream { 1 } else { requested },
        }
    }
}

/// Output of a backend call, ready for translation.
pub enum ExecutionResult {
    /// One generation per requested choice, in choice order.
    Completions(Vec<Generation>),
    /// A stream whose first event is already known to be a success.
    Stream(GenerationStream),
}

/// Run `model` on `backend` according to `options`.
///
/// When `timeout` is set it bounds every single-shot generation and, for
/// streams, everything up to the first event.
pub async fn execute(
    backend: &dyn Backend,
    model: &str,
    messages: &[Message],
    options: ExecutionOptions,
    timeout: Option<Duration>,
) -> Result<ExecutionResult> {
    if options.stream {
        let opened = bounded(timeout, async {
            let mut upstream = backend.generate_stream(model, messages).await?;
            let first = upstream.next().await;
            match first {
                Some(Err(e)) => Err(e),
                first => Ok((first, upstream)),
            }
        })
        .await;

        let (first, rest) = opened.map_err(|e| {
            tracing::warn!(model = %model, error = %e, "Backend failed to open stream");
            Error::Upstream(e)
        })?;

        let stream = stream::iter(first).chain(rest).boxed();
        return Ok(ExecutionResult::Stream(stream));
    }

    let calls = (0..options.choice_count).map(|_| bounded(timeout, backend.generate(model, messages)));
    let generations = try_join_all(calls).await.map_err(|e| {
        tracing::warn!(
            model = %model,
            choices = options.choice_count,
            error = %e,
            "Backend generation failed"
        );
        Error::Upstream(e)
    })?;

    Ok(ExecutionResult::Completions(generations))
}

async fn bounded<T, F>(limit: Option<Duration>, call: F) -> std::result::Result<T, BackendError>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| BackendError::Timeout(limit))?,
        None => call.await,
    }
}
