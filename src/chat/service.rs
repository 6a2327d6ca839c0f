//! Exchange orchestration: persistence plus model invocation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::store::ChatStore;
use crate::chat::types::{Conversation, ConversationId, Message};

/// Boxed future type for model client operations.
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fixed reply stored when the model returns no content.
pub const FALLBACK_REPLY: &str = "I'm not sure how to respond.";

/// External text-generation boundary consumed by the service.
pub trait ModelClient: Send + Sync {
    /// Produce a reply to a user message. `None` signals that the model
    /// answered without content.
    ///
    /// # Errors
    /// Returns an error if the external service fails.
    fn reply(&self, user_text: &str) -> ModelFuture<'_, ChatResult<Option<String>>>;

    /// Produce a short (2-5 word) title for a conversation seeded with the
    /// given message, with surrounding quote characters stripped.
    ///
    /// # Errors
    /// Returns an error if the external service fails.
    fn title(&self, seed_text: &str) -> ModelFuture<'_, ChatResult<String>>;
}

/// Orchestrates message persistence and model invocation for exchanges.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    model: Arc<dyn ModelClient>,
}

impl ChatService {
    /// Wire a service over a store and a model client.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, model: Arc<dyn ModelClient>) -> Self {
        Self { store, model }
    }

    /// Create an empty conversation with the placeholder title.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn create_conversation(&self) -> ChatResult<Conversation> {
        let conversation = self.store.create_conversation().await?;
        tracing::info!(conversation = %conversation.id, "created conversation");
        Ok(conversation)
    }

    /// List all conversations, most recently created first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        self.store.list_conversations().await
    }

    /// List the messages of a conversation in insertion order. An unknown id
    /// yields an empty sequence.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list_messages(&self, conversation_id: ConversationId) -> ChatResult<Vec<Message>> {
        self.store.list_messages(conversation_id).await
    }

    /// Submit one exchange: persist the user message, obtain the model
    /// reply, persist it, and assign the one-time automatic title on the
    /// first exchange. Returns the reply text.
    ///
    /// All writes commit in a single transaction, so a model or storage
    /// failure leaves no partial rows behind.
    ///
    /// # Errors
    /// Returns `ChatError::Validation` for empty input (before any store
    /// access), `ChatError::NotFound` for an unknown conversation, and
    /// storage or model errors otherwise.
    pub async fn submit_exchange(
        &self,
        conversation_id: ConversationId,
        user_text: &str,
    ) -> ChatResult<String> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(ChatError::NotFound(conversation_id))?;

        let reply = self
            .model
            .reply(text)
            .await?
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());

        // One automatic title per conversation; an empty candidate keeps the
        // placeholder and leaves the flag unset.
        let title = if conversation.title_assigned {
            None
        } else {
            Some(self.model.title(text).await?).filter(|t| !t.trim().is_empty())
        };

        let titled = self
            .store
            .record_exchange(conversation_id, text, &reply, title)
            .await?;
        if titled {
            tracing::debug!(conversation = %conversation_id, "assigned automatic title");
        }

        Ok(reply)
    }

    /// Rename a conversation. The new title is trimmed and must be
    /// non-empty.
    ///
    /// # Errors
    /// Returns `ChatError::Validation` for an empty title,
    /// `ChatError::NotFound` for an unknown conversation, and storage errors
    /// otherwise.
    pub async fn rename_conversation(
        &self,
        conversation_id: ConversationId,
        new_title: &str,
    ) -> ChatResult<()> {
        let title = new_title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("title must not be empty".to_string()));
        }

        if self.store.update_title(conversation_id, title).await? {
            Ok(())
        } else {
            Err(ChatError::NotFound(conversation_id))
        }
    }

    /// Delete a conversation and all its messages.
    ///
    /// # Errors
    /// Returns `ChatError::NotFound` for an unknown conversation and storage
    /// errors otherwise.
    pub async fn delete_conversation(&self, conversation_id: ConversationId) -> ChatResult<()> {
        if self.store.delete_conversation(conversation_id).await? {
            tracing::info!(conversation = %conversation_id, "deleted conversation");
            Ok(())
        } else {
            Err(ChatError::NotFound(conversation_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::chat::store::SqliteChatStore;
    use crate::chat::types::{Role, DEFAULT_TITLE};
    use crate::config::StorageConfig;
    use crate::llm::ollama::OllamaError;

    /// Model client scripted for tests.
    #[derive(Default)]
    struct ScriptedModel {
        reply: Option<String>,
        title: String,
        fail_reply: bool,
        fail_title: bool,
        reply_calls: AtomicUsize,
        title_calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn answering(reply: &str, title: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                title: title.to_string(),
                ..Self::default()
            }
        }
    }

    impl ModelClient for ScriptedModel {
        fn reply(&self, _user_text: &str) -> ModelFuture<'_, ChatResult<Option<String>>> {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            let out = if self.fail_reply {
                Err(ChatError::Model(OllamaError::HttpStatusNotOk(500)))
            } else {
                Ok(self.reply.clone())
            };
            Box::pin(async move { out })
        }

        fn title(&self, _seed_text: &str) -> ModelFuture<'_, ChatResult<String>> {
            self.title_calls.fetch_add(1, Ordering::SeqCst);
            let out = if self.fail_title {
                Err(ChatError::Model(OllamaError::HttpStatusNotOk(500)))
            } else {
                Ok(self.title.clone())
            };
            Box::pin(async move { out })
        }
    }

    async fn service_with(model: Arc<ScriptedModel>) -> (ChatService, Arc<SqliteChatStore>) {
        let config = StorageConfig {
            sqlite_path: ":memory:".into(),
        };
        let store = Arc::new(SqliteChatStore::new(&config).await.unwrap());
        let service = ChatService::new(store.clone(), model);
        (service, store)
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_write() {
        let model = Arc::new(ScriptedModel::answering("Hi!", "Greetings"));
        let (service, store) = service_with(model.clone()).await;
        let conversation = service.create_conversation().await.unwrap();

        for text in ["", "   ", "\n\t"] {
            let result = service.submit_exchange(conversation.id, text).await;
            assert!(matches!(result, Err(ChatError::Validation(_))));
        }

        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 0);
        assert_eq!(model.reply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected_before_any_write() {
        let model = Arc::new(ScriptedModel::answering("Hi!", "Greetings"));
        let (service, store) = service_with(model.clone()).await;

        let missing = ConversationId::from_i64(999);
        let result = service.submit_exchange(missing, "Hello").await;
        assert!(matches!(result, Err(ChatError::NotFound(id)) if id == missing));
        assert_eq!(store.count_messages(missing).await.unwrap(), 0);
        assert_eq!(model.reply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_exchange_stores_pair_and_assigns_title() {
        let model = Arc::new(ScriptedModel::answering("Hi there!", "Friendly Greeting"));
        let (service, store) = service_with(model.clone()).await;
        let conversation = service.create_conversation().await.unwrap();

        let reply = service
            .submit_exchange(conversation.id, "Hello")
            .await
            .unwrap();
        assert_eq!(reply, "Hi there!");

        let messages = service.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].body, "Hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].body, "Hi there!");

        let stored = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Friendly Greeting");
        assert_eq!(model.title_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_exchange_keeps_the_title() {
        let model = Arc::new(ScriptedModel::answering("Hi there!", "Friendly Greeting"));
        let (service, store) = service_with(model.clone()).await;
        let conversation = service.create_conversation().await.unwrap();

        service
            .submit_exchange(conversation.id, "Hello")
            .await
            .unwrap();
        service
            .submit_exchange(conversation.id, "And again")
            .await
            .unwrap();

        let stored = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Friendly Greeting");
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 4);
        // The assigned flag short-circuits the second title generation.
        assert_eq!(model.title_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_model_content_falls_back_to_fixed_reply() {
        let model = Arc::new(ScriptedModel {
            reply: None,
            title: "Fallback Chat".to_string(),
            ..ScriptedModel::default()
        });
        let (service, _store) = service_with(model).await;
        let conversation = service.create_conversation().await.unwrap();

        let reply = service
            .submit_exchange(conversation.id, "Hello")
            .await
            .unwrap();
        assert_eq!(reply, FALLBACK_REPLY);

        let messages = service.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages[1].body, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn model_failure_leaves_no_partial_rows() {
        let model = Arc::new(ScriptedModel {
            reply: Some("Hi!".to_string()),
            title: "Doomed".to_string(),
            fail_reply: true,
            ..ScriptedModel::default()
        });
        let (service, store) = service_with(model).await;
        let conversation = service.create_conversation().await.unwrap();

        let result = service.submit_exchange(conversation.id, "Hello").await;
        assert!(matches!(result, Err(ChatError::Model(_))));
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn title_failure_leaves_no_partial_rows() {
        let model = Arc::new(ScriptedModel {
            reply: Some("Hi!".to_string()),
            title: "Doomed".to_string(),
            fail_title: true,
            ..ScriptedModel::default()
        });
        let (service, store) = service_with(model).await;
        let conversation = service.create_conversation().await.unwrap();

        let result = service.submit_exchange(conversation.id, "Hello").await;
        assert!(matches!(result, Err(ChatError::Model(_))));
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_title_candidate_keeps_placeholder_and_retries_later() {
        let model = Arc::new(ScriptedModel::answering("Hi!", "  "));
        let (service, store) = service_with(model.clone()).await;
        let conversation = service.create_conversation().await.unwrap();

        service
            .submit_exchange(conversation.id, "Hello")
            .await
            .unwrap();

        let stored = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, DEFAULT_TITLE);
        assert!(!stored.title_assigned);

        service
            .submit_exchange(conversation.id, "Again")
            .await
            .unwrap();
        assert_eq!(model.title_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rename_validates_and_reports_unknown_ids() {
        let model = Arc::new(ScriptedModel::answering("Hi!", "Greetings"));
        let (service, _store) = service_with(model).await;
        let conversation = service.create_conversation().await.unwrap();

        let result = service.rename_conversation(conversation.id, "  ").await;
        assert!(matches!(result, Err(ChatError::Validation(_))));

        let result = service
            .rename_conversation(ConversationId::from_i64(999), "My Trip")
            .await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));

        service
            .rename_conversation(conversation.id, " My Trip ")
            .await
            .unwrap();
        let listed = service.list_conversations().await.unwrap();
        assert_eq!(listed[0].title, "My Trip");
    }

    #[tokio::test]
    async fn delete_removes_conversation_and_messages() {
        let model = Arc::new(ScriptedModel::answering("Hi!", "Greetings"));
        let (service, _store) = service_with(model).await;
        let conversation = service.create_conversation().await.unwrap();
        service
            .submit_exchange(conversation.id, "Hello")
            .await
            .unwrap();

        service.delete_conversation(conversation.id).await.unwrap();

        let result = service.delete_conversation(conversation.id).await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert!(service
            .list_messages(conversation.id)
            .await
            .unwrap()
            .is_empty());
        assert!(service.list_conversations().await.unwrap().is_empty());
    }
}
