//! HTTP server setup and configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers::{self, MODELMUX_REQUEST_ID_HEADER};
use crate::backend::{BackendCache, BackendRegistry};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::router::Router as ProviderRouter;

/// Correlation id assigned to every incoming request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub router: ProviderRouter,
    pub catalog: Arc<Catalog>,
    pub backends: Arc<BackendCache>,
    pub request_timeout: Option<Duration>,
}

impl AppState {
    /// Wire the catalog, router and backend cache together.
    ///
    /// Any catalog replacement retires every cached backend built for an older
    /// generation, so changed credentials or base URLs are picked up on next use.
    pub fn new(config: &Config, registry: BackendRegistry) -> Self {
        let catalog = Arc::new(Catalog::new(config.providers.clone()));
        let backends = Arc::new(BackendCache::new(Arc::new(registry)));

        let cache = backends.clone();
        catalog.on_change(move |snapshot| cache.retire_before(snapshot.generation));

        Self {
            router: ProviderRouter::new(catalog.clone()),
            catalog,
            backends,
            request_timeout: config.execution.request_timeout(),
        }
    }
}

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MODELMUX_REQUEST_ID_HEADER), value);
    }
    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        // modelmux extensions
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::list_providers))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
///
/// With a `config_path`, SIGHUP reloads the provider catalog from that file.
pub async fn run_server(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let registry = BackendRegistry::with_defaults(&config.execution);

    for provider in &config.providers {
        if !registry.supports(&provider.provider_type) {
            tracing::warn!(
                provider = %provider.id,
                provider_type = %provider.provider_type,
                "Provider type is not supported; requests routed to it will fail"
            );
        }
    }

    let state = AppState::new(&config, registry);

    #[cfg(unix)]
    if let Some(path) = config_path {
        spawn_reload_on_hangup(state.catalog.clone(), path)?;
    }
    #[cfg(not(unix))]
    let _ = config_path;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting modelmux server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Re-read providers from `path` on every SIGHUP.
///
/// Only the provider list is reloaded. A file that fails to load leaves the
/// current catalog in place.
#[cfg(unix)]
fn spawn_reload_on_hangup(catalog: Arc<Catalog>, path: PathBuf) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!(path = %path.display(), "Reloading provider catalog");
            match Config::from_file_with_env(&path) {
                Ok((config, _)) => catalog.replace(config.providers),
                Err(e) => {
                    tracing::error!(error = %e, "Catalog reload failed, keeping current providers")
                }
            }
        }
    });

    Ok(())
}
