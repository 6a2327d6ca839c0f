//! LLM components: the blocking Ollama client and its service adapter.

pub mod ollama;

pub use ollama::{OllamaClient, OllamaError, OllamaModelClient};
