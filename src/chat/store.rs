//! `SQLite`-backed persistence for conversations and messages.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::types::{
    Conversation, ConversationId, Message, MessageId, Role, DEFAULT_TITLE,
};
use crate::config::StorageConfig;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence contract for conversations and messages.
pub trait ChatStore: Send + Sync {
    /// Create an empty conversation with the placeholder title.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(&self) -> StoreFuture<'_, ChatResult<Conversation>>;

    /// Get a conversation by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>>;

    /// List all conversations, most recently created first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<Conversation>>>;

    /// Append a message under a conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the conversation id is
    /// unknown (foreign keys are enforced).
    fn insert_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        body: &str,
    ) -> StoreFuture<'_, ChatResult<Message>>;

    /// List the messages of a conversation in insertion order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>>;

    /// Count the messages of a conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn count_messages(&self, conversation_id: ConversationId) -> StoreFuture<'_, ChatResult<u64>>;

    /// Update the title of a conversation. Returns `false` when the id is
    /// unknown.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn update_title(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> StoreFuture<'_, ChatResult<bool>>;

    /// Delete a conversation and, by cascade, its messages. Returns `false`
    /// when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<bool>>;

    /// Persist one full exchange in a single transaction: the user message,
    /// the assistant message, and, when a title candidate is supplied, the
    /// one-time automatic title. The title is applied only if no automatic
    /// title has been assigned yet; returns whether it was applied.
    ///
    /// # Errors
    /// Returns an error if storage access fails; no partial rows remain.
    fn record_exchange(
        &self,
        conversation_id: ConversationId,
        user_body: &str,
        reply_body: &str,
        title: Option<String>,
    ) -> StoreFuture<'_, ChatResult<bool>>;
}

/// `SQLite` implementation of the chat store.
pub struct SqliteChatStore {
    conn: Connection,
}

impl SqliteChatStore {
    /// Open the database and ensure the two-table schema exists. Safe to
    /// call on every startup.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn new(config: &StorageConfig) -> ChatResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS conversations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL DEFAULT 'New Chat',
                    title_assigned INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id INTEGER NOT NULL,
                    role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                    body TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (conversation_id)
                        REFERENCES conversations (id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages (conversation_id, id);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Decode an epoch-milliseconds column into a timestamp.
    fn decode_ts(ms: i64) -> ChatResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ChatError::InvalidRow(format!("invalid timestamp: {ms}")))
    }
}

impl ChatStore for SqliteChatStore {
    fn create_conversation(&self) -> StoreFuture<'_, ChatResult<Conversation>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();

            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO conversations (title, created_at) VALUES (?1, ?2)",
                        rusqlite::params![DEFAULT_TITLE, now_ms],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            Ok(Conversation {
                id: ConversationId::from_i64(id),
                title: DEFAULT_TITLE.to_string(),
                title_assigned: false,
                created_at: Self::decode_ts(now_ms)?,
            })
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, title, title_assigned, created_at
                         FROM conversations
                         WHERE id = ?1",
                    )?;
                    let row = stmt
                        .query_row(rusqlite::params![id], |row| {
                            let id: ConversationId = row.get(0)?;
                            let title: String = row.get(1)?;
                            let assigned: bool = row.get(2)?;
                            let ts: i64 = row.get(3)?;
                            Ok((id, title, assigned, ts))
                        })
                        .optional()?;
                    Ok(row)
                })
                .await?;

            match row {
                Some((id, title, title_assigned, ts)) => Ok(Some(Conversation {
                    id,
                    title,
                    title_assigned,
                    created_at: Self::decode_ts(ts)?,
                })),
                None => Ok(None),
            }
        })
    }

    fn list_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, title, title_assigned, created_at
                         FROM conversations
                         ORDER BY created_at DESC, id DESC",
                    )?;
                    let rows = stmt
                        .query_map([], |row| {
                            let id: ConversationId = row.get(0)?;
                            let title: String = row.get(1)?;
                            let assigned: bool = row.get(2)?;
                            let ts: i64 = row.get(3)?;
                            Ok((id, title, assigned, ts))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut conversations = Vec::with_capacity(rows.len());
            for (id, title, title_assigned, ts) in rows {
                conversations.push(Conversation {
                    id,
                    title,
                    title_assigned,
                    created_at: Self::decode_ts(ts)?,
                });
            }

            Ok(conversations)
        })
    }

    fn insert_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        body: &str,
    ) -> StoreFuture<'_, ChatResult<Message>> {
        let body = body.to_string();
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let stored_body = body.clone();

            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO messages (conversation_id, role, body, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![conversation_id, role, stored_body, now_ms],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            Ok(Message {
                id: MessageId::from_i64(id),
                conversation_id,
                role,
                body,
                created_at: Self::decode_ts(now_ms)?,
            })
        })
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, role, body, created_at
                         FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY id",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![conversation_id], |row| {
                            let id: MessageId = row.get(0)?;
                            let role: Role = row.get(1)?;
                            let body: String = row.get(2)?;
                            let ts: i64 = row.get(3)?;
                            Ok((id, role, body, ts))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut messages = Vec::with_capacity(rows.len());
            for (id, role, body, ts) in rows {
                messages.push(Message {
                    id,
                    conversation_id,
                    role,
                    body,
                    created_at: Self::decode_ts(ts)?,
                });
            }

            Ok(messages)
        })
    }

    fn count_messages(&self, conversation_id: ConversationId) -> StoreFuture<'_, ChatResult<u64>> {
        Box::pin(async move {
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                        rusqlite::params![conversation_id],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;

            u64::try_from(count)
                .map_err(|_| ChatError::InvalidRow(format!("invalid message count: {count}")))
        })
    }

    fn update_title(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> StoreFuture<'_, ChatResult<bool>> {
        let title = title.to_string();
        Box::pin(async move {
            let updated = self
                .conn
                .call(move |conn| {
                    let updated = conn.execute(
                        "UPDATE conversations SET title = ?1 WHERE id = ?2",
                        rusqlite::params![title, conversation_id],
                    )?;
                    Ok(updated)
                })
                .await?;
            Ok(updated > 0)
        })
    }

    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<bool>> {
        Box::pin(async move {
            let deleted = self
                .conn
                .call(move |conn| {
                    let deleted = conn.execute(
                        "DELETE FROM conversations WHERE id = ?1",
                        rusqlite::params![id],
                    )?;
                    Ok(deleted)
                })
                .await?;
            Ok(deleted > 0)
        })
    }

    fn record_exchange(
        &self,
        conversation_id: ConversationId,
        user_body: &str,
        reply_body: &str,
        title: Option<String>,
    ) -> StoreFuture<'_, ChatResult<bool>> {
        let user_body = user_body.to_string();
        let reply_body = reply_body.to_string();
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();

            let title_applied = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;

                    tx.execute(
                        "INSERT INTO messages (conversation_id, role, body, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![conversation_id, Role::User, user_body, now_ms],
                    )?;
                    tx.execute(
                        "INSERT INTO messages (conversation_id, role, body, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![conversation_id, Role::Assistant, reply_body, now_ms],
                    )?;

                    // The title_assigned guard makes a racing second exchange a no-op.
                    let mut applied = false;
                    if let Some(title) = title {
                        applied = tx.execute(
                            "UPDATE conversations
                             SET title = ?1, title_assigned = 1
                             WHERE id = ?2 AND title_assigned = 0",
                            rusqlite::params![title, conversation_id],
                        )? > 0;
                    }

                    tx.commit()?;
                    Ok(applied)
                })
                .await?;

            Ok(title_applied)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store() -> SqliteChatStore {
        let config = StorageConfig {
            sqlite_path: ":memory:".into(),
        };
        SqliteChatStore::new(&config).await.unwrap()
    }

    #[tokio::test]
    async fn new_conversation_has_placeholder_title() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();

        assert_eq!(conversation.title, DEFAULT_TITLE);
        assert!(!conversation.title_assigned);

        let fetched = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(fetched, Some(conversation));
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();

        store
            .insert_message(conversation.id, Role::User, "first")
            .await
            .unwrap();
        store
            .insert_message(conversation.id, Role::Assistant, "second")
            .await
            .unwrap();

        let messages = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].body, "second");
    }

    #[tokio::test]
    async fn insert_against_unknown_conversation_is_rejected() {
        let store = open_store().await;
        let result = store
            .insert_message(ConversationId::from_i64(999), Role::User, "orphan")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn record_exchange_inserts_pair_and_titles_once() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();

        let applied = store
            .record_exchange(conversation.id, "Hello", "Hi!", Some("Greetings".to_string()))
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 2);

        let fetched = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "Greetings");
        assert!(fetched.title_assigned);

        // A second candidate loses to the assigned flag.
        let applied = store
            .record_exchange(conversation.id, "More", "Sure", Some("Other".to_string()))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 4);

        let fetched = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "Greetings");
    }

    #[tokio::test]
    async fn record_exchange_without_title_keeps_placeholder() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();

        let applied = store
            .record_exchange(conversation.id, "Hello", "Hi!", None)
            .await
            .unwrap();
        assert!(!applied);

        let fetched = store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, DEFAULT_TITLE);
        assert!(!fetched.title_assigned);
    }

    #[tokio::test]
    async fn update_title_reports_unknown_ids() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();

        assert!(store
            .update_title(conversation.id, "My Trip")
            .await
            .unwrap());
        assert!(!store
            .update_title(ConversationId::from_i64(999), "Nope")
            .await
            .unwrap());

        let listed = store.list_conversations().await.unwrap();
        assert_eq!(listed[0].title, "My Trip");
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let store = open_store().await;
        let conversation = store.create_conversation().await.unwrap();
        store
            .record_exchange(conversation.id, "Hello", "Hi!", None)
            .await
            .unwrap();

        assert!(store.delete_conversation(conversation.id).await.unwrap());
        assert!(!store.delete_conversation(conversation.id).await.unwrap());

        assert_eq!(store.get_conversation(conversation.id).await.unwrap(), None);
        assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
        assert_eq!(store.count_messages(conversation.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let store = open_store().await;
        let first = store.create_conversation().await.unwrap();
        let second = store.create_conversation().await.unwrap();

        let listed = store.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 2);
        // Equal timestamps fall back to id order, newest first.
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
