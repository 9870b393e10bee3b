//! Connection Registry - Registro delle connessioni live
//!
//! Associa ogni utente autenticato alla sua unica connessione attiva.
//! Una nuova connessione dello stesso utente sostituisce e chiude la precedente.

use crate::core::WsError;
use crate::dtos::WsEventDTO;
use crate::ws::membership::MembershipCache;
use axum::extract::ws::{CloseFrame, Utf8Bytes, close_code};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Lunghezza massima della reason di un close frame (125 byte meno il codice)
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Motivo della chiusura di una connessione
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Lo stesso utente ha aperto una connessione più recente
    Superseded,
    /// Frame malformato o accesso negato
    PolicyViolation(String),
    IdleTimeout,
    /// Il client ha chiuso o il socket è caduto: nessun close frame da inviare
    ClientGone,
    ServerError(String),
}

impl CloseReason {
    pub fn from_error(err: &WsError) -> Self {
        match err.close_code() {
            Some(close_code::POLICY) => CloseReason::PolicyViolation(err.to_string()),
            _ => CloseReason::ServerError(err.to_string()),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            CloseReason::Superseded | CloseReason::IdleTimeout => Some(close_code::NORMAL),
            CloseReason::PolicyViolation(_) => Some(close_code::POLICY),
            CloseReason::ServerError(_) => Some(close_code::ERROR),
            CloseReason::ClientGone => None,
        }
    }

    /// Close frame da inviare al client, `None` se il client non c'è più
    pub fn close_frame(&self) -> Option<CloseFrame> {
        let code = self.code()?;
        let reason = match self {
            CloseReason::Superseded => "superseded by a newer connection",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::PolicyViolation(reason) | CloseReason::ServerError(reason) => reason.as_str(),
            CloseReason::ClientGone => "",
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from(truncate_reason(reason)),
        })
    }
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Esito negativo di un push sulla coda di uscita
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// Coda piena: client lento, l'evento viene scartato
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

#[derive(Debug)]
struct ConnectionInner {
    id: Uuid,
    user_id: i32,
    chat_id: i32,
    outbound: mpsc::Sender<Arc<WsEventDTO>>,
    shutdown: watch::Sender<Option<CloseReason>>,
}

/// Handle di una connessione live. Clonarlo è economico: tutte le copie
/// puntano alla stessa coda di uscita e allo stesso segnale di chiusura.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Estremità lato task di una connessione: le consuma il task di scrittura
pub struct ConnectionStreams {
    pub outbound: mpsc::Receiver<Arc<WsEventDTO>>,
    pub shutdown: watch::Receiver<Option<CloseReason>>,
}

impl Connection {
    /// Crea una connessione per `user_id` indirizzata alla chat `chat_id`,
    /// con una coda di uscita limitata a `capacity` eventi
    pub fn new(user_id: i32, chat_id: i32, capacity: usize) -> (Self, ConnectionStreams) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let connection = Connection {
            inner: Arc::new(ConnectionInner {
                id: Uuid::new_v4(),
                user_id,
                chat_id,
                outbound: outbound_tx,
                shutdown: shutdown_tx,
            }),
        };
        let streams = ConnectionStreams {
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        (connection, streams)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn user_id(&self) -> i32 {
        self.inner.user_id
    }

    pub fn chat_id(&self) -> i32 {
        self.inner.chat_id
    }

    /// Accoda un evento senza mai attendere: se la coda è piena l'evento è perso
    pub fn push(&self, event: Arc<WsEventDTO>) -> Result<(), PushError> {
        if self.inner.shutdown.borrow().is_some() {
            return Err(PushError::Closed);
        }
        self.inner.outbound.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Segnala la chiusura al task di scrittura. Solo la prima chiamata ha effetto.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.inner.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// Nuovo ricevitore del segnale di chiusura (il valore attuale risulta già visto)
    pub fn subscribe_shutdown(&self) -> watch::Receiver<Option<CloseReason>> {
        self.inner.shutdown.subscribe()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.shutdown.borrow().clone()
    }

    /// `true` quando il task di scrittura è terminato e ha rilasciato la coda
    pub fn writer_finished(&self) -> bool {
        self.inner.outbound.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.borrow().is_some() || self.inner.outbound.is_closed()
    }
}

pub struct ConnectionRegistry {
    /// Key: user_id, Value: connessione attiva dell'utente
    connections: DashMap<i32, Connection>,
    /// Aggiornata sotto il lock della entry di `connections`: l'ordine dei lock
    /// è sempre connections → rooms
    rooms: MembershipCache,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: DashMap::new(),
            rooms: MembershipCache::new(),
        }
    }

    pub fn rooms(&self) -> &MembershipCache {
        &self.rooms
    }

    /// Registra la connessione come unica connessione dell'utente e riparte
    /// con le sottoscrizioni dalla sola chat della connessione.
    ///
    /// # Returns
    /// * `Ok(Some(Connection))` - Connessione precedente, già chiusa con `Superseded`
    /// * `Ok(None)` - Nessuna connessione precedente
    /// * `Err(WsError::InvalidConnection)` - L'handle era già chiuso
    #[instrument(skip(self, connection), fields(user_id = connection.user_id(), chat_id = connection.chat_id()))]
    pub fn attach(&self, connection: Connection) -> Result<Option<Connection>, WsError> {
        if connection.is_closed() {
            warn!("Attach rejected: connection handle already closed");
            return Err(WsError::InvalidConnection);
        }

        let user_id = connection.user_id();
        let chat_id = connection.chat_id();
        let new_id = connection.id();

        let previous = match self.connections.entry(user_id) {
            Entry::Occupied(mut slot) => {
                self.rooms.reset(user_id, chat_id);
                Some(slot.insert(connection))
            }
            Entry::Vacant(slot) => {
                self.rooms.reset(user_id, chat_id);
                slot.insert(connection);
                None
            }
        };

        // il lock della entry è già rilasciato: chiudere è solo un segnale
        match previous {
            Some(old) if old.id() != new_id => {
                info!(old_connection = %old.id(), "Closing superseded connection");
                old.close(CloseReason::Superseded);
                Ok(Some(old))
            }
            _ => {
                info!("Total online users: {}", self.connections.len());
                Ok(None)
            }
        }
    }

    /// Rimuove la connessione dell'utente e tutte le sue sottoscrizioni.
    /// Idempotente.
    #[instrument(skip(self))]
    pub fn detach(&self, user_id: i32) -> Option<Connection> {
        match self.connections.entry(user_id) {
            Entry::Occupied(slot) => {
                let dropped = self.rooms.clear(user_id);
                debug!(rooms = dropped, "User detached");
                Some(slot.remove())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Come `detach`, ma solo se `connection_id` è ancora la connessione
    /// corrente: una connessione sostituita non rimuove quella che l'ha sostituita.
    #[instrument(skip(self))]
    pub fn detach_connection(&self, user_id: i32, connection_id: Uuid) -> bool {
        match self.connections.entry(user_id) {
            Entry::Occupied(slot) if slot.get().id() == connection_id => {
                let dropped = self.rooms.clear(user_id);
                slot.remove();
                debug!(rooms = dropped, "Connection detached");
                true
            }
            _ => {
                debug!("Connection already replaced or removed");
                false
            }
        }
    }

    pub fn lookup(&self, user_id: i32) -> Option<Connection> {
        self.connections.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_user_online(&self, user_id: i32) -> bool {
        self.connections.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_signalled_once() {
        let (connection, streams) = Connection::new(1, 5, 4);
        assert!(!connection.is_closed());
        assert!(connection.close(CloseReason::IdleTimeout));
        assert!(!connection.close(CloseReason::Superseded), "First reason wins");
        assert_eq!(*streams.shutdown.borrow(), Some(CloseReason::IdleTimeout));
        assert_eq!(connection.push(Arc::new(test_event())), Err(PushError::Closed));
    }

    #[test]
    fn push_on_full_queue_fails_without_blocking() {
        let (connection, _streams) = Connection::new(1, 5, 1);
        assert_eq!(connection.push(Arc::new(test_event())), Ok(()));
        assert_eq!(connection.push(Arc::new(test_event())), Err(PushError::Full));
    }

    #[test]
    fn dropped_receiver_marks_connection_closed() {
        let (connection, streams) = Connection::new(1, 5, 1);
        drop(streams);
        assert!(connection.is_closed());
    }

    #[test]
    fn close_frame_reason_fits_protocol_limit() {
        let reason = CloseReason::PolicyViolation("è".repeat(200));
        let frame = reason.close_frame().unwrap();
        assert_eq!(frame.code, close_code::POLICY);
        assert!(frame.reason.as_str().len() <= MAX_CLOSE_REASON_BYTES);
        assert!(CloseReason::ClientGone.close_frame().is_none());
    }

    #[test]
    fn reattaching_same_handle_does_not_close_it() {
        let registry = ConnectionRegistry::new();
        let (connection, _streams) = Connection::new(1, 5, 4);
        registry.attach(connection.clone()).unwrap();
        assert!(registry.attach(connection.clone()).unwrap().is_none());
        assert!(!connection.is_closed());
    }

    fn test_event() -> WsEventDTO {
        WsEventDTO::Error {
            code: 500,
            message: "test".to_string(),
        }
    }
}
