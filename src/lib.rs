pub mod api; // HTTP shell: routes under /api
pub mod chat; // Help-assist chat turns, titles, suggestions
pub mod config;
pub mod core_state; // Shared request state, built once at startup
pub mod llm; // Gemini / Ollama chat backends
pub mod models;
pub mod pipeline; // Validate → preprocess → classify → explain
pub mod reference; // Encyclopedia lookup + text-to-speech
pub mod symptoms; // Symptom checklist scorer

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::{CoreState, StartupError};

/// Load configuration, the classifier and the service clients, then serve
/// the API until Ctrl-C.
pub fn run() -> Result<(), StartupError> {
    // .env before tracing so RUST_LOG from the file applies
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr;
    let core = Arc::new(CoreState::from_config(config)?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(core, bind_addr))
}

async fn serve(core: Arc<CoreState>, addr: std::net::SocketAddr) -> Result<(), StartupError> {
    let mut server = api::start_api_server(core, addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}
