//! Message DTOs - Data Transfer Objects per messaggi e conferme di lettura

use crate::entities::{Message, ReadReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Messaggio come viene inviato ai client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageDTO {
    pub id: Uuid,
    pub chat_id: i32,
    pub sender_id: i32,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<ReadByDTO>,
}

impl From<Message> for MessageDTO {
    fn from(value: Message) -> Self {
        Self {
            id: value.message_id,
            chat_id: value.chat_id,
            sender_id: value.sender_id,
            text: value.content,
            created_at: value.created_at,
            // un messaggio appena creato non è ancora stato letto da nessuno
            read_by: Vec::new(),
        }
    }
}

/// Elemento della lista `read_by` di un messaggio
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadByDTO {
    pub user_id: i32,
    pub read_at: DateTime<Utc>,
}

impl From<ReadReceipt> for ReadByDTO {
    fn from(value: ReadReceipt) -> Self {
        Self {
            user_id: value.user_id,
            read_at: value.read_at,
        }
    }
}

/// Notifica di lettura recapitata al mittente del messaggio
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadNotificationDTO {
    pub message_id: Uuid,
    pub reader_id: i32,
    pub read_at: DateTime<Utc>,
}

impl From<ReadReceipt> for ReadNotificationDTO {
    fn from(value: ReadReceipt) -> Self {
        Self {
            message_id: value.message_id,
            reader_id: value.user_id,
            read_at: value.read_at,
        }
    }
}

/// DTO per creare un nuovo messaggio (senza message_id)
#[derive(Debug, Clone, Validate)]
pub struct CreateMessageDTO {
    pub chat_id: i32,
    pub sender_id: i32,

    #[validate(length(min = 1, max = 5000, message = "Message content must be between 1 and 5000 characters"))]
    pub content: String,
}
