//! HTTP boundary for the reverie engine. Deserialization, routing and
//! status mapping live here; all card semantics live in `reverie-engine`.

mod handlers;

use anyhow::Context;
use reverie_engine::config::EngineCfg;
use reverie_engine::orchestrator::Engine;
use reverie_llm::provider::LlmProvider;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider = reverie_llm::http::from_env()
        .context("model provider not configured: set REVERIE_LLM_MODEL and REVERIE_LLM_API_KEY")?;
    let cfg = EngineCfg::from_env();
    tracing::info!(provider = provider.name(), "engine configured");

    let engine = Engine::new(Arc::new(provider), cfg);
    let app = handlers::router(engine);

    let addr = std::env::var("REVERIE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, "reverie gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
