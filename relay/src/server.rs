use std::any::Any;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::protocol::{
    example_response, ErrorResponse, HealthResponse, SuggestRequest, SuggestResponse,
};
use crate::suggester::SuggestionRouter;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    suggester: Arc<SuggestionRouter>,
    credential_configured: bool,
    max_text_chars: usize,
}

impl AppState {
    pub fn new(
        suggester: SuggestionRouter,
        credential_configured: bool,
        max_text_chars: usize,
    ) -> Self {
        Self {
            suggester: Arc::new(suggester),
            credential_configured,
            max_text_chars,
        }
    }
}

pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("english assistant listening on http://{addr}");
        info!("endpoints: POST /suggest, POST /improve, GET /health, GET /test, GET /");

        axum::serve(listener, build_app(self.state, &self.config))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server terminated unexpectedly")
    }
}

pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/test", get(example))
        .route("/suggest", post(suggest))
        .route("/improve", post(suggest))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No text provided")]
    EmptyText,
    #[error("Text too long (max {0} characters)")]
    TooLong(usize),
    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyText | ApiError::TooLong(_) | ApiError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "handler panicked".to_string()
    };
    error!("request handler panicked: {detail}");
    ApiError::Internal(detail).into_response()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        state.credential_configured,
        state.suggester.primary_source().as_str(),
    ))
}

async fn example() -> Json<SuggestResponse> {
    Json(example_response())
}

async fn suggest(
    State(state): State<AppState>,
    payload: Result<Json<SuggestRequest>, JsonRejection>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let Json(request) = payload?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::EmptyText);
    }
    if state.max_text_chars > 0 && text.chars().count() > state.max_text_chars {
        return Err(ApiError::TooLong(state.max_text_chars));
    }

    let (suggestion, source) = state.suggester.suggest(text).await;
    Ok(Json(SuggestResponse::new(text.to_string(), suggestion, source)))
}
