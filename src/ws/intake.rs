//! Message Intake - Validazione, persistenza e fan-out dei nuovi messaggi
//!
//! La deduplica usa una chiave di idempotenza opzionale scelta dal client
//! (`client_id` nel frame). Per ogni chat si ricorda l'ultimo messaggio
//! accettato: se lo stesso mittente ripete la stessa chiave, il messaggio già
//! salvato viene restituito senza una seconda scrittura né un secondo broadcast.
//! È una deduplica best-effort dei retry immediati, non una garanzia di unicità.

use crate::core::{AppState, WsError};
use crate::dtos::{CreateMessageDTO, WsEventDTO};
use crate::entities::Message;
use crate::ws::broadcast::broadcast_to_chat;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

struct DedupMarker {
    sender_id: i32,
    client_key: Option<String>,
    message: Message,
}

/// Ultimo messaggio accettato per ogni chat. Vive solo in memoria.
pub struct DedupMarkers {
    last_seen: DashMap<i32, DedupMarker>,
}

impl Default for DedupMarkers {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupMarkers {
    pub fn new() -> Self {
        Self {
            last_seen: DashMap::new(),
        }
    }

    /// Messaggio già accettato per la stessa (chat, mittente, chiave), se c'è
    pub fn check(&self, chat_id: i32, sender_id: i32, client_key: &str) -> Option<Message> {
        self.last_seen.get(&chat_id).and_then(|marker| {
            let same_key = marker.client_key.as_deref() == Some(client_key);
            (same_key && marker.sender_id == sender_id).then(|| marker.message.clone())
        })
    }

    pub fn record(&self, chat_id: i32, sender_id: i32, client_key: Option<String>, message: Message) {
        self.last_seen.insert(
            chat_id,
            DedupMarker {
                sender_id,
                client_key,
                message,
            },
        );
    }

    pub fn last_message_id(&self, chat_id: i32) -> Option<Uuid> {
        self.last_seen.get(&chat_id).map(|marker| marker.message.message_id)
    }
}

/// Valida, salva e inoltra un nuovo messaggio
/// Operazioni:
/// 1. Rifiutare testo vuoto o troppo lungo (errore di protocollo)
/// 2. Generare un nuovo id
/// 3. Se la chiave di idempotenza coincide con l'ultimo messaggio della chat, restituirlo
/// 4. Salvare il messaggio nello store
/// 5. Aggiornare il marker della chat
/// 6. Inoltrare il messaggio a tutti i membri online della chat
#[instrument(skip(state, text, client_key))]
pub async fn submit_message(
    state: &AppState,
    chat_id: i32,
    sender_id: i32,
    text: &str,
    client_key: Option<&str>,
) -> Result<Message, WsError> {
    let dto = CreateMessageDTO {
        chat_id,
        sender_id,
        content: text.to_string(),
    };
    dto.validate()?;
    if dto.content.trim().is_empty() {
        return Err(WsError::protocol("message text must not be blank"));
    }

    let message_id = Uuid::new_v4();

    if let Some(key) = client_key {
        if let Some(previous) = state.dedup.check(chat_id, sender_id, key) {
            info!(message_id = %previous.message_id, "Duplicate submission, returning stored message");
            return Ok(previous);
        }
    }

    // nessun lock condiviso è tenuto durante la scrittura
    let message = state
        .store
        .create_message(dto.chat_id, dto.sender_id, &dto.content, message_id)
        .await?;
    debug!(message_id = %message.message_id, "Message persisted");

    state.dedup.record(
        chat_id,
        sender_id,
        client_key.map(str::to_string),
        message.clone(),
    );

    let event = Arc::new(WsEventDTO::Message(message.clone().into()));
    broadcast_to_chat(&state.users_online, chat_id, event);

    Ok(message)
}
