//! MemoryChatStore - Store in memoria
//!
//! Usato dai test e per avviare il server senza database. Le chat vengono
//! create direttamente con `create_chat`, come farebbe il layer HTTP esterno.

use super::{ChatStore, StoreError};
use crate::entities::{ChatMembership, ChatType, Message, ReadReceipt};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub struct MemoryChatStore {
    chats: DashMap<i32, ChatMembership>,
    messages: DashMap<Uuid, Message>,
    receipts: DashMap<(Uuid, i32), ReadReceipt>,
    next_chat_id: AtomicI32,
    available: AtomicBool,
    message_writes: AtomicUsize,
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            chats: DashMap::new(),
            messages: DashMap::new(),
            receipts: DashMap::new(),
            next_chat_id: AtomicI32::new(1),
            available: AtomicBool::new(true),
            message_writes: AtomicUsize::new(0),
        }
    }

    /// Crea una chat con l'id successivo disponibile
    pub fn create_chat(&self, chat_type: ChatType, member_ids: Vec<i32>) -> i32 {
        let chat_id = self.next_chat_id.fetch_add(1, Ordering::SeqCst);
        self.insert_chat(chat_id, chat_type, member_ids);
        chat_id
    }

    /// Crea (o sostituisce) una chat con un id scelto dal chiamante
    pub fn insert_chat(&self, chat_id: i32, chat_type: ChatType, member_ids: Vec<i32>) {
        self.next_chat_id.fetch_max(chat_id + 1, Ordering::SeqCst);
        self.chats.insert(
            chat_id,
            ChatMembership {
                chat_id,
                chat_type,
                member_ids,
            },
        );
    }

    /// Simula un guasto transitorio: finché è `false` ogni operazione fallisce
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Numero di chiamate `create_message` andate a buon fine
    pub fn message_writes(&self) -> usize {
        self.message_writes.load(Ordering::SeqCst)
    }

    pub fn messages_in_chat(&self, chat_id: i32) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.chat_id == chat_id)
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    pub fn receipts_for(&self, message_id: Uuid) -> Vec<ReadReceipt> {
        self.receipts
            .iter()
            .filter(|entry| entry.key().0 == message_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            warn!("Memory store marked as unavailable");
            Err(StoreError::Unavailable("memory store disabled".to_string()))
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_chat_membership(&self, chat_id: i32) -> Result<Option<ChatMembership>, StoreError> {
        self.ensure_available()?;
        Ok(self.chats.get(&chat_id).map(|chat| chat.value().clone()))
    }

    #[instrument(skip(self, content))]
    async fn create_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        content: &str,
        message_id: Uuid,
    ) -> Result<Message, StoreError> {
        self.ensure_available()?;
        match self.messages.entry(message_id) {
            Entry::Occupied(_) => Err(StoreError::Corrupted(format!(
                "message {message_id} already exists"
            ))),
            Entry::Vacant(slot) => {
                let message = Message {
                    message_id,
                    chat_id,
                    sender_id,
                    content: content.to_string(),
                    created_at: Utc::now(),
                };
                slot.insert(message.clone());
                self.message_writes.fetch_add(1, Ordering::SeqCst);
                debug!("Message stored");
                Ok(message)
            }
        }
    }

    async fn create_read_receipt(&self, message_id: Uuid, user_id: i32) -> Result<ReadReceipt, StoreError> {
        self.ensure_available()?;
        if !self.messages.contains_key(&message_id) {
            return Err(StoreError::NotFound);
        }
        let receipt = self
            .receipts
            .entry((message_id, user_id))
            .or_insert_with(|| ReadReceipt {
                message_id,
                user_id,
                read_at: Utc::now(),
            })
            .value()
            .clone();
        Ok(receipt)
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, StoreError> {
        self.ensure_available()?;
        Ok(self.messages.get(&message_id).map(|m| m.value().clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_receipt_is_stored_once_per_reader() {
        let store = MemoryChatStore::new();
        let chat_id = store.create_chat(ChatType::Personal, vec![1, 2]);
        let message = store
            .create_message(chat_id, 1, "hi", Uuid::new_v4())
            .await
            .unwrap();

        let first = store.create_read_receipt(message.message_id, 2).await.unwrap();
        let second = store.create_read_receipt(message.message_id, 2).await.unwrap();

        assert_eq!(first, second, "Second call must return the original receipt");
        assert_eq!(store.receipts_for(message.message_id).len(), 1);
    }

    #[tokio::test]
    async fn read_receipt_for_missing_message_is_not_found() {
        let store = MemoryChatStore::new();
        let result = store.create_read_receipt(Uuid::new_v4(), 2).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryChatStore::new();
        store.set_available(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.get_chat_membership(1).await.is_err());
        assert_eq!(store.message_writes(), 0);
    }

    #[test]
    fn insert_chat_moves_id_sequence_forward() {
        let store = MemoryChatStore::new();
        store.insert_chat(10, ChatType::Group, vec![1, 2, 3]);
        assert_eq!(store.create_chat(ChatType::Personal, vec![1, 2]), 11);
    }
}
