//! Configuration for the Aurora server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::error::{ChatError, ChatResult};

/// Environment variable for the `SQLite` database path.
const DB_PATH_ENV: &str = "AURORA_DB_PATH";
/// Environment variable for the Ollama model name.
const MODEL_ENV: &str = "AURORA_MODEL";
/// Environment variable for a custom Ollama URL (e.g., "http://127.0.0.1:11434").
const OLLAMA_URL_ENV: &str = "AURORA_OLLAMA_URL";
/// Environment variable for the model keep-alive duration.
const KEEP_ALIVE_ENV: &str = "AURORA_KEEP_ALIVE";
/// Environment variable that enables spawning `ollama serve` at startup.
const SPAWN_OLLAMA_ENV: &str = "AURORA_SPAWN_OLLAMA";
/// Environment variable for the HTTP listen port.
const PORT_ENV: &str = "AURORA_PORT";

/// Top-level configuration for the Aurora server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuroraConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Model client settings.
    pub model: ModelConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl AuroraConfig {
    /// Build a configuration from `AURORA_*` environment variables,
    /// falling back to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.model.model = model;
        }
        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            config.model.base_url = url;
        }
        if let Ok(keep_alive) = std::env::var(KEEP_ALIVE_ENV) {
            config.model.keep_alive = keep_alive;
        }
        if let Ok(spawn) = std::env::var(SPAWN_OLLAMA_ENV) {
            config.model.spawn_server = matches!(spawn.as_str(), "1" | "true" | "yes");
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are empty or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.storage.sqlite_path.as_os_str().is_empty() {
            return Err(ChatError::Validation(
                "storage.sqlite_path must not be empty".to_string(),
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(ChatError::Validation(
                "model.model must not be empty".to_string(),
            ));
        }

        if self.model.keep_alive.trim().is_empty() {
            return Err(ChatError::Validation(
                "model.keep_alive must not be empty".to_string(),
            ));
        }

        Url::parse(&self.model.base_url)
            .map_err(|err| ChatError::Validation(format!("model.base_url is invalid: {err}")))?;

        if self.server.port == 0 {
            return Err(ChatError::Validation(
                "server.port must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the `SQLite` database file.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("aurora.db"),
        }
    }
}

/// Model client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as installed in Ollama.
    pub model: String,
    /// Base URL of the Ollama API.
    pub base_url: String,
    /// Keep the model loaded in memory for this duration between requests.
    pub keep_alive: String,
    /// Spawn `ollama serve` at startup when the API is unreachable.
    pub spawn_server: bool,
    /// Binary used to spawn the Ollama server.
    pub ollama_bin: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "mistral".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            keep_alive: "5m".to_string(),
            spawn_server: false,
            ollama_bin: "ollama".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the server listens on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::server::DEFAULT_PORT,
        }
    }
}
