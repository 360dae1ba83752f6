mod catalog;
mod config;
mod error;
mod fetcher;
mod gemini;
mod history;
mod media;
mod models;
mod orchestrator;
mod prompt;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    catalog::Catalog,
    config::AppConfig,
    fetcher::HttpReferenceFetcher,
    gemini::{GeminiClient, PlaceholderGenerator},
    orchestrator::{ImageGenerator, Orchestrator},
    routes::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::from_dir(path).with_context(|| format!("loading catalog from {}", path.display()))?,
        None => Catalog::builtin().context("loading built-in catalog")?,
    };
    tracing::info!(
        models = catalog.all_models().len(),
        backgrounds = catalog.backgrounds().len(),
        "Catalog ready"
    );

    let generator: Arc<dyn ImageGenerator> = match &config.gemini_api_key {
        Some(api_key) => {
            tracing::info!("Using API key: {}...", api_key.chars().take(4).collect::<String>());
            Arc::new(GeminiClient::new(api_key.clone(), config.gemini_api_base.clone(), config.gemini_image_model.clone()))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not set, running in demo mode with placeholder images");
            Arc::new(PlaceholderGenerator)
        }
    };
    let fetcher = HttpReferenceFetcher::new(config.fetch_timeout).context("building HTTP client")?;

    let orchestrator = Orchestrator::new(Arc::new(catalog), Arc::new(fetcher), generator)
        .with_required_details(config.require_product_details);
    let state = AppState::new(Arc::new(orchestrator), config.persist_results, config.generation_timeout);
    let app = routes::router(state, config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        require_product_details = config.require_product_details,
        persist_results = config.persist_results,
        demo_mode = config.demo_mode(),
        "Starting server"
    );
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
