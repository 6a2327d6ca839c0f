//! Chat subsystem for the Aurora server.
//!
//! Organized into:
//! - `types`: Identifier newtypes, roles, and the two stored records
//! - `error`: Error type shared across the subsystem
//! - `store`: `SQLite`-backed persistence for conversations and messages
//! - `service`: Exchange orchestration and the model-client seam

pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use error::{ChatError, ChatResult};
pub use service::{ChatService, ModelClient};
pub use store::{ChatStore, SqliteChatStore};
pub use types::{Conversation, ConversationId, Message, MessageId, Role};
