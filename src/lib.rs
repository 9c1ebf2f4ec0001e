pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod embedding;
pub mod error;
pub mod listing;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod server;
pub mod state;

use anyhow::Context;
use tokio::net::TcpListener;

use config::AppPaths;
use state::AppState;

pub async fn run() -> anyhow::Result<()> {
    let paths = AppPaths::from_env();
    logging::init(&paths)?;

    let state = AppState::initialize(paths).context("Failed to initialize application state")?;
    let documents = state.db.count_documents()?;
    tracing::info!(
        config = %state.paths.config_file.display(),
        documents,
        "knowledge base ready"
    );

    let addr = config::paths::listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let app = server::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
