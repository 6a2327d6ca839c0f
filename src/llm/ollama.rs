//! Ollama client for reply and title generation.
//!
//! Goals:
//! - No `unsafe`.
//! - Blocking HTTP for deterministic startup and generation; the async
//!   service reaches it through `spawn_blocking`.
//!
//! Behaviour:
//! - Check whether Ollama is reachable via `GET /api/version`.
//! - If not reachable (and spawning is enabled), spawn `ollama serve` and
//!   poll until ready.
//! - Generate text via `POST /api/generate` with runtime options.

use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::error::ChatResult;
use crate::chat::service::{ModelClient, ModelFuture};
use crate::config::ModelConfig;

/// Target context length (tokens).
const CONTEXT_LENGTH: u32 = 8_192;

/// Default token budget for reply generation.
const DEFAULT_NUM_PREDICT: u32 = 512;
/// Token budget for title generation; titles are 2-5 words.
const TITLE_NUM_PREDICT: u32 = 16;

/// Startup wait settings.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_RETRY: Duration = Duration::from_millis(250);

/// HTTP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// HTTP client timeout for long-running generations.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Prompt used to seed title generation.
const TITLE_PROMPT_PREFIX: &str = "Generate a short title (2-5 words) for a chat about: ";

/// Errors produced by the Ollama client.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Failed to spawn Ollama due to an OS I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Ollama did not become ready in time.
    #[error("ollama startup timed out")]
    StartupTimeout,
    /// HTTP response was not a success.
    #[error("ollama http status not ok: {0}")]
    HttpStatusNotOk(u16),
    /// HTTP client error when using the blocking client.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: u32,
    num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// Blocking Ollama client for ensuring server readiness and generating text.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the Ollama server at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, OllamaError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Ensure Ollama is reachable, spawning `ollama serve` when it is not.
    ///
    /// # Errors
    /// Returns an error if Ollama cannot be reached or started in time.
    pub fn ensure_server_running(&self, ollama_bin: &str) -> Result<(), OllamaError> {
        if self.is_ready()? {
            return Ok(());
        }

        spawn_ollama_serve(ollama_bin)?;
        self.wait_until_ready()
    }

    /// Generate a response and return the raw model output, `None` when the
    /// server answered without content.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response is malformed.
    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        keep_alive: &str,
        num_predict: u32,
    ) -> Result<Option<String>, OllamaError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            keep_alive,
            options: GenerateOptions {
                num_ctx: CONTEXT_LENGTH,
                num_predict,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::HttpStatusNotOk(status.as_u16()));
        }

        let body = response.json::<GenerateResponse>()?;
        Ok(body.response)
    }

    fn is_ready(&self) -> Result<bool, OllamaError> {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).send() {
            Ok(response) => Ok(response.status().is_success()),
            Err(err) if err.is_connect() || err.is_timeout() => Ok(false),
            Err(err) => Err(OllamaError::HttpClient(err)),
        }
    }

    fn wait_until_ready(&self) -> Result<(), OllamaError> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;

        while Instant::now() < deadline {
            if self.is_ready()? {
                return Ok(());
            }
            sleep(STARTUP_RETRY);
        }

        Err(OllamaError::StartupTimeout)
    }
}

fn spawn_ollama_serve(ollama_bin: &str) -> Result<(), OllamaError> {
    // `ollama serve` keeps running after this process drops the handle.
    // Stdout/stderr are silenced to avoid printing in production.
    let _child = Command::new(ollama_bin)
        .arg("serve")
        .env("OLLAMA_CONTEXT_LENGTH", CONTEXT_LENGTH.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(())
}

/// Normalize a raw title: trim it and drop any quote characters the model
/// wrapped it in.
fn clean_title(raw: &str) -> String {
    raw.trim().replace('"', "").trim().to_string()
}

/// [`ModelClient`] implementation backed by [`OllamaClient`].
pub struct OllamaModelClient {
    client: OllamaClient,
    model: String,
    keep_alive: String,
}

impl OllamaModelClient {
    /// Build the adapter from the model configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, OllamaError> {
        Ok(Self {
            client: OllamaClient::new(config.base_url.clone())?,
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
        })
    }

    /// Build the adapter over an existing client.
    #[must_use]
    pub fn with_client(client: OllamaClient, config: &ModelConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
        }
    }
}

impl ModelClient for OllamaModelClient {
    fn reply(&self, user_text: &str) -> ModelFuture<'_, ChatResult<Option<String>>> {
        let client = self.client.clone();
        let model = self.model.clone();
        let keep_alive = self.keep_alive.clone();
        let prompt = user_text.to_string();

        Box::pin(async move {
            let response = tokio::task::spawn_blocking(move || {
                client.generate(&model, &prompt, &keep_alive, DEFAULT_NUM_PREDICT)
            })
            .await??;
            Ok(response)
        })
    }

    fn title(&self, seed_text: &str) -> ModelFuture<'_, ChatResult<String>> {
        let client = self.client.clone();
        let model = self.model.clone();
        let keep_alive = self.keep_alive.clone();
        let prompt = format!("{TITLE_PROMPT_PREFIX}{seed_text}");

        Box::pin(async move {
            let response = tokio::task::spawn_blocking(move || {
                client.generate(&model, &prompt, &keep_alive, TITLE_NUM_PREDICT)
            })
            .await??;
            Ok(response.as_deref().map(clean_title).unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_title_strips_surrounding_quotes() {
        assert_eq!(clean_title("\"My Trip\""), "My Trip");
        assert_eq!(clean_title("  \"Plans for Tokyo\"\n"), "Plans for Tokyo");
        assert_eq!(clean_title("No Quotes Here"), "No Quotes Here");
        assert_eq!(clean_title("\"\""), "");
    }

    #[test]
    fn generate_request_serializes_expected_shape() {
        let request = GenerateRequest {
            model: "mistral",
            prompt: "Hello",
            stream: false,
            keep_alive: "5m",
            options: GenerateOptions {
                num_ctx: CONTEXT_LENGTH,
                num_predict: TITLE_NUM_PREDICT,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "mistral");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_ctx"], 8_192);
        assert_eq!(value["options"]["num_predict"], 16);
    }
}
