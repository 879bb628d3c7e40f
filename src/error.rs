//! Error types for modelmux.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::backend::BackendError;

/// Result type alias for modelmux operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for modelmux.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Model '{model}' is not configured on any provider")]
    ModelNotConfigured { model: String },

    #[error("No available provider for model '{model}'")]
    NoAvailableCandidate { model: String },

    #[error(
        "Unsupported provider type '{provider_type}' (supported: {})",
        .supported.join(", ")
    )]
    UnsupportedProviderType {
        provider_type: String,
        supported: Vec<String>,
    },

    #[error("Failed to initialize backend for provider '{provider}': {source}")]
    BackendInit {
        provider: String,
        #[source]
        source: BackendError,
    },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] BackendError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl Error {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ModelNotConfigured { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NoAvailableCandidate { .. }
            | Error::UnsupportedProviderType { .. }
            | Error::BackendInit { .. }
            | Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
