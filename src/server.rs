//! HTTP and WebSocket entry points.
//!
//! | Route                     | Purpose                                   |
//! |---------------------------|-------------------------------------------|
//! | `GET /`                   | banner                                    |
//! | `GET /health`             | which collaborators are configured        |
//! | `GET /ws/{client_id}`     | progress channel for one movie id         |
//! | `POST /api/movies/create` | start a job, returns before work begins   |

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::SubmitError;
use crate::generator::Orchestrator;
use crate::model::{Job, MovieRequest};
use crate::registry::{ConnectionRegistry, progress_channel};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, config: Config) -> Self {
        let registry = Arc::clone(orchestrator.registry());
        Self {
            orchestrator,
            registry,
            config: Arc::new(config),
        }
    }
}

/// Handler error rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Submit(SubmitError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Submit(SubmitError::Duplicate(_)) => (StatusCode::CONFLICT, "CONFLICT"),
        };
        let body = json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovieResponse {
    pub success: bool,
    pub movie_id: String,
    pub message: &'static str,
    pub status: &'static str,
}

fn service_label(configured: bool) -> &'static str {
    if configured { "connected" } else { "not_configured" }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("MyLife Cinema API v{}", env!("CARGO_PKG_VERSION")),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let services = state.config.service_status();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "openai": service_label(services.openai),
            "supabase": service_label(services.supabase),
            "replicate": service_label(services.replicate),
        },
        "connections": state.registry.connection_count().await,
    }))
}

async fn create_movie(
    State(state): State<AppState>,
    Json(request): Json<MovieRequest>,
) -> Result<Json<CreateMovieResponse>, AppError> {
    let job = Job::from(request);
    let handle = state.orchestrator.submit(job)?;

    Ok(Json(CreateMovieResponse {
        success: true,
        movie_id: handle.job_id().to_string(),
        message: "영화 생성이 시작되었습니다.",
        status: "processing",
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state.registry))
}

/// Forward progress events for `client_id` to the socket until either side
/// goes away. Inbound frames only keep the connection alive.
async fn handle_socket(socket: WebSocket, client_id: String, registry: Arc<ConnectionRegistry>) {
    tracing::info!(client_id = %client_id, "progress socket connected");

    let (tx, mut rx) = progress_channel();
    registry.register(client_id.clone(), tx.clone()).await;

    let (mut sink, mut stream) = socket.split();

    let sender_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(client_id = %sender_id, error = %e, "unserializable progress event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(client_id = %sender_id, "progress socket sink closed");
                break;
            }
        }
    });

    let receiver_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {
                    tracing::trace!(client_id = %receiver_id, "keep-alive frame");
                }
                Err(e) => {
                    tracing::debug!(client_id = %receiver_id, error = %e, "progress socket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.release(&client_id, &tx).await;
    tracing::info!(client_id = %client_id, "progress socket disconnected");
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws/{client_id}", get(ws_handler))
        .route("/api/movies/create", post(create_movie))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
