mod analysis;
mod analytics;
mod analyzer;
mod auth;
mod candidates;
mod config;
mod db;
mod demo;
mod documents;
mod errors;
mod extract;
mod job_descriptions;
mod llm_client;
mod messages;
mod models;
mod routes;
mod state;
mod subscriptions;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analyzer::LlmAnalyzer;
use crate::config::Config;
use crate::db::create_pool;
use crate::demo::spawn_sweeper;
use crate::llm_client::{LlmClient, ModelTier};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},analytics=info,tower_http=info",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Recruiter API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs pending migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.ai_provider, config.ai_api_key.clone())?;
    info!(
        "LLM client initialized ({:?}, models: {} / {})",
        llm.provider(),
        llm.model(ModelTier::Fast),
        llm.model(ModelTier::Accurate)
    );
    let analyzer = Arc::new(LlmAnalyzer::new(llm));

    // Build app state
    let state = AppState::new(db, analyzer, config.clone());

    // Prune stale demo counters hourly
    spawn_sweeper(state.demo_limiter.clone());

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
