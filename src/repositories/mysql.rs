//! MySqlChatStore - Store su MySQL
//!
//! Le tabelle (vedi `migrations/`) sono gestite dal layer HTTP esterno per la
//! parte di chat e partecipanti; qui si leggono le membership e si scrivono
//! messaggi e conferme di lettura.

// Le query usano le funzioni runtime di sqlx (query_as::<_, Row>) invece delle
// macro query_as!: le macro richiedono un database raggiungibile a compile time.

use super::{ChatStore, StoreError};
use crate::entities::{ChatMembership, ChatType, Message, ReadReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlPool};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(FromRow)]
struct ChatRow {
    id: i32,
    is_group: bool,
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    chat_id: i32,
    sender_id: i32,
    text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let message_id = Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::Corrupted(format!("message id {}: {}", row.id, e)))?;
        Ok(Message {
            message_id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            content: row.text,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReadRow {
    user_id: i32,
    read_at: DateTime<Utc>,
}

pub struct MySqlChatStore {
    connection_pool: MySqlPool,
}

impl MySqlChatStore {
    pub fn new(connection_pool: MySqlPool) -> Self {
        Self { connection_pool }
    }
}

#[async_trait]
impl ChatStore for MySqlChatStore {
    #[instrument(skip(self))]
    async fn get_chat_membership(&self, chat_id: i32) -> Result<Option<ChatMembership>, StoreError> {
        let chat = sqlx::query_as::<_, ChatRow>("SELECT id, is_group FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.connection_pool)
            .await?;

        let Some(chat) = chat else {
            debug!("Chat not found");
            return Ok(None);
        };

        let member_ids: Vec<i32> =
            sqlx::query_scalar("SELECT user_id FROM chat_participants WHERE chat_id = ?")
                .bind(chat.id)
                .fetch_all(&self.connection_pool)
                .await?;

        Ok(Some(ChatMembership {
            chat_id: chat.id,
            chat_type: ChatType::from(chat.is_group),
            member_ids,
        }))
    }

    #[instrument(skip(self, content))]
    async fn create_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        content: &str,
        message_id: Uuid,
    ) -> Result<Message, StoreError> {
        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message_id.to_string())
        .bind(chat_id)
        .bind(sender_id)
        .bind(content)
        .bind(created_at)
        .execute(&self.connection_pool)
        .await?;

        // rileggo la riga per restituire il timestamp con la precisione della colonna
        self.get_message(message_id).await?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn create_read_receipt(&self, message_id: Uuid, user_id: i32) -> Result<ReadReceipt, StoreError> {
        let id = message_id.to_string();

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM messages WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.connection_pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        // UNIQUE (message_id, user_id): un secondo insert per la stessa coppia viene ignorato
        sqlx::query("INSERT IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.connection_pool)
            .await?;

        let row = sqlx::query_as::<_, ReadRow>(
            "SELECT user_id, read_at FROM message_reads WHERE message_id = ? AND user_id = ?",
        )
        .bind(&id)
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await?;

        Ok(ReadReceipt {
            message_id,
            user_id: row.user_id,
            read_at: row.read_at,
        })
    }

    #[instrument(skip(self))]
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, sender_id, text, created_at FROM messages WHERE id = ?",
        )
        .bind(message_id.to_string())
        .fetch_optional(&self.connection_pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.connection_pool).await?;
        Ok(())
    }
}
