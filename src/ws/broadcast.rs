//! Broadcast Router - Consegna degli eventi alle connessioni live

use crate::dtos::WsEventDTO;
use crate::ws::registry::{Connection, ConnectionRegistry, PushError};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Invia un evento a tutti gli utenti sottoscritti alla chat
/// Operazioni:
/// 1. Recuperare dalla Membership Cache gli utenti sottoscritti alla chat
/// 2. Per ogni utente, cercare la connessione nel registro
/// 3. Accodare l'evento senza attendere (coda piena = evento scartato)
/// 4. Saltare in silenzio gli utenti la cui connessione è appena sparita
///
/// # Returns
/// Numero di connessioni a cui l'evento è stato accodato
#[instrument(skip(registry, event))]
pub fn broadcast_to_chat(registry: &ConnectionRegistry, chat_id: i32, event: Arc<WsEventDTO>) -> usize {
    // la lista viene raccolta prima: nessun lock della cache resta aperto durante i push
    let members = registry.rooms().members_of(chat_id);

    let sent_count = members
        .iter()
        .filter_map(|user_id| registry.lookup(*user_id))
        .filter(|connection| deliver(connection, event.clone()))
        .count();

    info!(
        receivers = sent_count,
        subscribed = members.len(),
        "Event broadcast to chat"
    );
    sent_count
}

/// Invia un evento a un singolo utente, se connesso
#[instrument(skip(registry, event))]
pub fn send_direct(registry: &ConnectionRegistry, user_id: i32, event: Arc<WsEventDTO>) -> bool {
    match registry.lookup(user_id) {
        Some(connection) => deliver(&connection, event),
        None => {
            debug!("User not online, event not sent");
            false
        }
    }
}

fn deliver(connection: &Connection, event: Arc<WsEventDTO>) -> bool {
    match connection.push(event) {
        Ok(()) => true,
        Err(PushError::Full) => {
            warn!(
                user_id = connection.user_id(),
                "Outbound queue full, event dropped for slow client"
            );
            false
        }
        Err(PushError::Closed) => {
            debug!(user_id = connection.user_id(), "Connection closing, event skipped");
            false
        }
    }
}
