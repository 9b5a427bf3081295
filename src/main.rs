use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use movie_agent_backend::config::AppConfig;
use movie_agent_backend::database::Database;
use movie_agent_backend::llm::OllamaService;
use movie_agent_backend::query_parser::QueryParser;
use movie_agent_backend::{build_router, AppState};

/// Conversational REST API over the TMDB 5000 + MovieLens movie dataset,
/// answered by a local LLM (Ollama).
#[derive(Debug, Parser)]
#[command(name = "movie-agent-backend", version)]
struct Cli {
    /// Path to the SQLite database built by `setup-db`
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long)]
    bind: Option<String>,

    /// Base URL of the Ollama HTTP API
    #[arg(long)]
    ollama_url: Option<String>,

    /// Ollama model used for answer generation
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default().await?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = cli.ollama_url {
        config.ollama_base_url = url;
    }
    if let Some(model) = cli.model {
        config.ollama_model = model;
    }

    let db = Arc::new(Database::new(config.db_path.clone()));
    let llm = Arc::new(OllamaService::new(
        &config.ollama_base_url,
        &config.ollama_model,
        config.ollama_timeout_secs,
    ));
    let parser = Arc::new(QueryParser::new()?);

    tracing::info!(
        db = %config.db_path.display(),
        model = %config.ollama_model,
        "application started"
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        db,
        llm,
        parser,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("movie agent backend listening on http://{bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
