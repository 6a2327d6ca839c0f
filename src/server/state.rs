//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::error::ChatResult;
use crate::chat::service::ChatService;
use crate::chat::store::SqliteChatStore;
use crate::config::AuroraConfig;
use crate::llm::ollama::{OllamaClient, OllamaModelClient};

/// Shared application state.
pub struct AppState {
    /// Conversation service backing every route.
    pub service: ChatService,
}

impl AppState {
    /// Create a new application state: open the store and wire the service
    /// over the given Ollama client.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &AuroraConfig, ollama: OllamaClient) -> ChatResult<Arc<Self>> {
        let store = SqliteChatStore::new(&config.storage).await?;
        let model = OllamaModelClient::with_client(ollama, &config.model);
        let service = ChatService::new(Arc::new(store), Arc::new(model));

        Ok(Arc::new(Self { service }))
    }
}
