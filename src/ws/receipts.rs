//! Read Receipts - Conferme di lettura

use crate::core::{AppState, WsError};
use crate::dtos::WsEventDTO;
use crate::entities::ReadReceipt;
use crate::ws::broadcast::send_direct;
use crate::ws::guard::authorize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Registra che `reader_id` ha letto il messaggio e avvisa il mittente
/// Operazioni:
/// 1. Recuperare il messaggio per conoscerne chat e mittente
/// 2. Verificare che il lettore sia membro della chat del messaggio
/// 3. Salvare la conferma (idempotente: una sola per lettore)
/// 4. Inviare l'evento `read` al solo mittente, se è online
///
/// # Returns
/// * `Ok(ReadReceipt)` - Conferma salvata (o quella già esistente)
/// * `Err(WsError::NotFound)` - Il messaggio non esiste
/// * `Err(WsError::AccessDenied)` - Il lettore non è membro della chat del messaggio
#[instrument(skip(state))]
pub async fn mark_read(state: &AppState, message_id: Uuid, reader_id: i32) -> Result<ReadReceipt, WsError> {
    let message = state
        .store
        .get_message(message_id)
        .await?
        .ok_or(WsError::NotFound)?;

    authorize(state.store.as_ref(), message.chat_id, reader_id).await?;

    let receipt = state.store.create_read_receipt(message_id, reader_id).await?;

    let event = Arc::new(WsEventDTO::Read(receipt.clone().into()));
    if !send_direct(&state.users_online, message.sender_id, event) {
        debug!(sender_id = message.sender_id, "Read notification not delivered");
    }

    Ok(receipt)
}
