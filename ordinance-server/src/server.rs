use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use ordinance_rag::{ErrorKind, OrdinanceRag, QueryEventStream, QueryFailure, QueryRequest, RagError};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;

const NDJSON: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct AppState {
    pub rag: OrdinanceRag,
}

impl AppState {
    pub fn new(rag: OrdinanceRag) -> Self {
        Self { rag }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/collection", get(collection))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for ordinance server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ordinance-server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, shutting down");
    }
}

/// A [`RagError`] rendered as `{"error", "detail"}` with a status by kind.
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Completion => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(QueryFailure::from(&self.0))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"ordinance-server"}))
}

async fn collection(State(state): State<AppState>) -> Result<Response, ApiError> {
    let info = state.rag.store().info().await?;
    Ok(Json(info).into_response())
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    if !request.stream {
        let answer = state.rag.answer(&request).await?;
        return Ok(Json(answer).into_response());
    }

    let mut events = state.rag.answer_stream(request);
    // Retrieval happens before the first event, so its failures still get a
    // proper status code.
    let first = match events.next().await {
        Some(Err(e)) => return Err(e.into()),
        Some(Ok(event)) => line(&event),
        None => Bytes::new(),
    };

    let body = Body::from_stream(ndjson(first, events));
    Ok(([(header::CONTENT_TYPE, NDJSON)], body).into_response())
}

/// One JSON value followed by a newline.
fn line<T: Serialize>(value: &T) -> Bytes {
    let mut bytes = serde_json::to_vec(value).unwrap_or_default();
    bytes.push(b'\n');
    Bytes::from(bytes)
}

/// The rest of the stream as NDJSON lines. A failure is written as a final
/// `{"type": "error", "content", "detail"}` line.
fn ndjson(
    first: Bytes,
    mut events: QueryEventStream,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        yield Ok(first);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => yield Ok(line(&event)),
                Err(e) => {
                    error!(error = %e, "answer stream failed");
                    yield Ok(line(&json!({
                        "type": "error",
                        "content": e.user_message(),
                        "detail": e.to_string(),
                    })));
                    break;
                }
            }
        }
    }
}
