//! axum router and listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::WrapErr;
use hatescore_core::{ScoreError, Scorer};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, instrument, warn};

use crate::adapter::RequestAdapter;
use crate::error::ApiError;
use crate::protocol::{
    HealthResponse, LegacyRequest, LegacyResponse, MessageResponse, SingleScore, SingleTweet,
    TweetItem, TweetScore, ROOT_MESSAGE,
};

pub const DEFAULT_BIND: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 8000);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Largest accepted `/analyze_tweets` payload, in items.
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

#[derive(Clone)]
struct AppState {
    adapter: RequestAdapter,
    max_batch_size: usize,
}

/// Build the application router around an already loaded scorer.
pub fn router(scorer: Arc<dyn Scorer>, config: &ServerConfig) -> Router {
    let state = AppState {
        adapter: RequestAdapter::new(scorer),
        max_batch_size: config.max_batch_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze_tweet", post(analyze_tweet))
        .route("/analyze_tweets", post(analyze_tweets))
        .route("/detect-toxicity", post(detect_toxicity))
        .layer(cors)
        .with_state(state)
}

/// Serve until ctrl-c. A scorer that failed to load is still served; its
/// routes answer 500 and `/health` answers 503.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
#[instrument(skip(scorer, config), fields(bind = %config.bind, max_batch_size = config.max_batch_size))]
pub async fn run(scorer: Arc<dyn Scorer>, config: &ServerConfig) -> eyre::Result<()> {
    if let Some(reason) = scorer.load_error() {
        warn!(%reason, "starting in degraded mode");
    }
    let model = if scorer.is_loaded() { "loaded" } else { "unavailable" };

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.bind))?;
    let local = listener.local_addr()?;
    info!(addr = %local, model, "listening");

    axum::serve(listener, router(scorer, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let scorer = state.adapter.scorer();
    if scorer.is_loaded() {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
                model_loaded: true,
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".into(),
                model_loaded: false,
                reason: scorer.load_error().map(str::to_string),
            }),
        )
    }
}

#[instrument(skip_all)]
async fn analyze_tweet(
    State(state): State<AppState>,
    payload: Result<Json<SingleTweet>, JsonRejection>,
) -> Result<Json<SingleScore>, ApiError> {
    let Json(request) = payload?;
    let adapter = state.adapter;
    blocking(move || adapter.handle_single(request)).await.map(Json)
}

#[instrument(skip_all, fields(items = tracing::field::Empty))]
async fn analyze_tweets(
    State(state): State<AppState>,
    payload: Result<Json<Vec<TweetItem>>, JsonRejection>,
) -> Result<Json<Vec<TweetScore>>, ApiError> {
    let Json(items) = payload?;
    tracing::Span::current().record("items", items.len());
    if items.len() > state.max_batch_size {
        return Err(ScoreError::BatchTooLarge {
            len: items.len(),
            max: state.max_batch_size,
        }
        .into());
    }
    let adapter = state.adapter;
    blocking(move || adapter.handle_batch(items)).await.map(Json)
}

#[instrument(skip_all)]
async fn detect_toxicity(
    State(state): State<AppState>,
    payload: Result<Json<LegacyRequest>, JsonRejection>,
) -> Result<Json<LegacyResponse>, ApiError> {
    let Json(request) = payload?;
    let adapter = state.adapter;
    blocking(move || adapter.handle_legacy(request)).await.map(Json)
}

/// Run scoring on the blocking pool so the forward pass never stalls the
/// runtime's worker threads.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ScoreError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ScoreError::Inference(format!("scoring task failed: {e}")).into()),
    }
}
