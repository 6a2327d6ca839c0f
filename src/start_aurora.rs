//! Startup helpers for the Aurora server.

use std::process::ExitCode;

use crate::config::AuroraConfig;
use crate::llm::ollama::OllamaClient;
use crate::server::{self, AppState};

/// Run the server until shutdown.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Aurora v{}", env!("CARGO_PKG_VERSION"));

    let config = AuroraConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }
    tracing::info!("Ollama endpoint: {}", config.model.base_url);

    let ollama = match OllamaClient::new(config.model.base_url.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to create Ollama client: {e}");
            return ExitCode::from(1);
        }
    };

    // Spawning must happen before the runtime starts: the readiness probe
    // blocks on the reqwest blocking client.
    if config.model.spawn_server {
        if let Err(e) = ollama.ensure_server_running(&config.model.ollama_bin) {
            tracing::error!("Ollama is unavailable: {e}");
            return ExitCode::from(1);
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = rt.block_on(async {
        let state = AppState::new(&config, ollama).await?;
        server::run_server(state, config.server.port).await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}
