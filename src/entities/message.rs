//! Message entity - Entità messaggio e conferma di lettura

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messaggio persistito. Il contenuto è immutabile dopo la creazione,
/// cresce solo l'insieme delle conferme di lettura associate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    // assegnato dal server prima della persistenza, non dallo store
    pub message_id: Uuid,
    pub chat_id: i32,
    pub sender_id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Conferma di lettura: al massimo una per coppia (messaggio, lettore)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub user_id: i32,
    pub read_at: DateTime<Utc>,
}
