use std::sync::Arc;
use tracing::{info, warn};

use ptt_chat::{
    api,
    chat::ChatSession,
    completion::OpenAiClient,
    config::Config,
    fetch::HttpFetcher,
    state::SharedState,
    worker::QueryWorker,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    info!("Starting PTT chat server");
    info!("Search URL: {}", config.worker.search_url);
    if config.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; completion calls will be rejected");
    }

    let shared = Arc::new(SharedState::new(config.worker.forum_scope.clone()));

    // Background scraping runs on its own thread
    let fetcher = HttpFetcher::new()?;
    let mut worker = QueryWorker::new(Arc::clone(&shared), fetcher, config.worker.clone()).start()?;

    let completion = Arc::new(OpenAiClient::new(&config)?);
    let state = Arc::new(AppState {
        chat: ChatSession::new(config.assistant_name.clone(), Arc::clone(&shared), completion),
        shared,
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("PTT chat server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gracefully shutting down...");
    tokio::task::spawn_blocking(move || worker.stop()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
