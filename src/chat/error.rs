//! Error types for the chat subsystem.

use thiserror::Error;

use crate::chat::types::ConversationId;
use crate::llm::ollama::OllamaError;

/// Chat subsystem error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Rejected input; nothing was written.
    #[error("validation error: {0}")]
    Validation(String),
    /// The referenced conversation does not exist.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    Store(#[from] tokio_rusqlite::Error),
    /// A stored row could not be decoded.
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
    /// The external model service failed.
    #[error("model client error: {0}")]
    Model(#[from] OllamaError),
    /// The blocking bridge to the model client failed.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
