pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod query_parser;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::database::Database;
use crate::llm::OllamaService;
use crate::query_parser::QueryParser;

/// Shared application services, injected into every handler. Collaborators
/// are wired here at construction time, never through globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub llm: Arc<OllamaService>,
    pub parser: Arc<QueryParser>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(api::chat::chat))
        .route("/chat/parse", post(api::parse::parse_message))
        .route("/movies", get(api::movies::list_movies))
        .route("/movies/:id", get(api::movies::get_movie))
        .route("/genres", get(api::movies::list_genres))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        "{method} {path} -> {} ({} ms)",
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}

/// Check database connectivity and Ollama availability.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.health_check().await;
    let ollama = state.llm.health_check().await;

    let status = if db_ok && ollama.model_loaded {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "database": db_ok,
        "ollama": ollama,
    }))
}
