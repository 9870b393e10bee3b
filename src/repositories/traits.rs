//! Store contract
//!
//! This module defines the narrow interface the live messaging core needs from
//! the persistence layer. The store is authoritative for durable history; the
//! core only orchestrates and routes.

use crate::entities::{ChatMembership, Message, ReadReceipt};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist
    #[error("record not found")]
    NotFound,

    /// Transient failure, the operation may succeed later
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded into an entity
    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence collaborator of the live messaging core
///
/// Implementations must be safe to share between every connection task.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Reads the durable membership of a chat
    ///
    /// # Returns
    /// * `Ok(Some(ChatMembership))` - Chat found
    /// * `Ok(None)` - No chat with that ID
    async fn get_chat_membership(&self, chat_id: i32) -> Result<Option<ChatMembership>, StoreError>;

    /// Persists a new message with the ID chosen by the caller
    async fn create_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        content: &str,
        message_id: Uuid,
    ) -> Result<Message, StoreError>;

    /// Persists a read receipt for (message, user)
    ///
    /// Idempotent: a second call for the same pair returns the receipt stored
    /// by the first one.
    ///
    /// # Returns
    /// * `Err(StoreError::NotFound)` - The message does not exist
    async fn create_read_receipt(&self, message_id: Uuid, user_id: i32) -> Result<ReadReceipt, StoreError>;

    /// Reads a message by its ID
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Cheap liveness probe used by the health endpoint
    async fn ping(&self) -> Result<(), StoreError>;
}
