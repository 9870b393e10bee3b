//! WebSocket Module - Gestione WebSocket per comunicazione real-time
//!
//! Questo modulo gestisce le connessioni WebSocket per la messaggistica live:
//! - Ammissione (token + membership) prima dell'upgrade
//! - Registro delle connessioni e sottoscrizioni alle chat
//! - Intake dei messaggi, conferme di lettura e fan-out

pub mod broadcast;
pub mod connection;
pub mod event_handlers;
pub mod guard;
pub mod intake;
pub mod membership;
pub mod receipts;
pub mod registry;

// Re-exports pubblici
pub use broadcast::{broadcast_to_chat, send_direct};
pub use connection::{ConnectionState, handle_socket};
pub use guard::authorize;
pub use intake::{DedupMarkers, submit_message};
pub use receipts::mark_read;
pub use registry::{CloseReason, Connection, ConnectionRegistry};

use crate::core::{AppState, WsError, auth};
use crate::entities::UserIdentity;
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub token: Option<String>,
}

/// Entry point per gestire richieste di upgrade WebSocket su `/ws/{chat_id}`
/// Operazioni:
/// 1. Estrarre il token (query `token` o header `Authorization: Bearer`)
/// 2. Verificare il token e la membership della chat
/// 3. Eseguire upgrade HTTP -> WebSocket
/// 4. Passare la connessione ad handle_socket, oppure chiuderla con il codice dell'errore
#[instrument(skip(ws, query, headers, state))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(chat_id): Path<i32>,
    Query(query): Query<WsConnectQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = query.token.or_else(|| auth::bearer_token(&headers));

    match admit(&state, token.as_deref(), chat_id).await {
        Ok(identity) => {
            info!(user_id = identity.user_id, username = %identity.username, "Connection admitted");
            let user_id = identity.user_id;
            ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, chat_id))
        }
        Err(e) => {
            warn!("Connection refused: {}", e);
            ws.on_upgrade(move |socket| reject_socket(socket, e))
        }
    }
}

/// Verifica token e membership. Nessuna risorsa viene allocata prima del successo.
async fn admit(state: &AppState, token: Option<&str>, chat_id: i32) -> Result<UserIdentity, WsError> {
    let token = token.ok_or(WsError::Auth(auth::AuthError::Invalid))?;
    let identity = auth::verify_token(token, &state.jwt_keys)?;
    authorize(state.store.as_ref(), chat_id, identity.user_id).await?;
    Ok(identity)
}

async fn reject_socket(mut socket: WebSocket, err: WsError) {
    let Some(frame) = CloseReason::from_error(&err).close_frame() else {
        return;
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame: {:?}", e);
    }
}

/// Sottoscrive un utente connesso a un'altra chat, dopo l'Access Guard.
///
/// # Returns
/// * `Ok(true)` - Sottoscrizione aggiunta
/// * `Ok(false)` - L'utente non ha una sessione live
/// * `Err(WsError::AccessDenied)` - L'utente non è membro della chat
pub async fn join_room(state: &AppState, user_id: i32, chat_id: i32) -> Result<bool, WsError> {
    authorize(state.store.as_ref(), chat_id, user_id).await?;
    Ok(state.users_online.rooms().join(user_id, chat_id))
}

pub fn leave_room(state: &AppState, user_id: i32, chat_id: i32) -> bool {
    state.users_online.rooms().leave(user_id, chat_id)
}
