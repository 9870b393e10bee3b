//! WebSocket Event Handlers - Handler per eventi WebSocket in ingresso

use crate::core::{AppState, WsError};
use crate::dtos::ClientEventDTO;
use crate::ws::intake::submit_message;
use crate::ws::receipts::mark_read;
use crate::ws::registry::Connection;
use tracing::{info, instrument, warn};

/// Decodifica un frame testuale del client.
///
/// Tipo sconosciuto, campo mancante o JSON non valido sono violazioni di protocollo.
pub fn parse_client_event(text: &str) -> Result<ClientEventDTO, WsError> {
    serde_json::from_str::<ClientEventDTO>(text).map_err(|e| {
        warn!("Failed to deserialize client frame: {}", e);
        WsError::protocol(format!("malformed frame: {e}"))
    })
}

/// Smista un frame del client verso l'handler del suo tipo.
/// Operazioni:
/// 1. Decodificare il frame (errore di protocollo se malformato)
/// 2. `message`: salvare e inoltrare il messaggio nella chat della connessione
/// 3. `read`: registrare la conferma e avvisare il mittente
#[instrument(skip(state, connection, text), fields(user_id = connection.user_id(), chat_id = connection.chat_id()))]
pub async fn process_message(state: &AppState, connection: &Connection, text: &str) -> Result<(), WsError> {
    match parse_client_event(text)? {
        ClientEventDTO::Message { text, client_id } => {
            let message = submit_message(
                state,
                connection.chat_id(),
                connection.user_id(),
                &text,
                client_id.as_deref(),
            )
            .await?;
            info!(message_id = %message.message_id, "Message accepted");
        }
        ClientEventDTO::Read { message_id } => {
            mark_read(state, message_id, connection.user_id()).await?;
            info!(%message_id, "Read receipt recorded");
        }
    }
    Ok(())
}
