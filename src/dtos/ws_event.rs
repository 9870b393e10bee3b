//! WebSocket Event DTOs - Data Transfer Objects per eventi WebSocket

use crate::dtos::{MessageDTO, ReadNotificationDTO};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eventi inviati dal server ai client.
/// Serde serializza questo come:
/// { "type": "message", "data": { ... } }
/// oppure
/// { "type": "read", "data": { ... } }
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsEventDTO {
    Message(MessageDTO),
    Read(ReadNotificationDTO),
    /// Operazione fallita senza chiusura della connessione
    Error { code: u16, message: String },
}

/// Frame accettati dal client. Qualsiasi altra forma è una violazione del protocollo.
/// { "type": "message", "text": "..." }
/// { "type": "read", "message_id": "<uuid>" }
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEventDTO {
    Message {
        text: String,
        /// Chiave di idempotenza opzionale scelta dal client per i retry
        #[serde(default)]
        client_id: Option<String>,
    },
    Read {
        message_id: Uuid,
    },
}
