//! WebSocket Connection Management - Gestione connessioni WebSocket
//!
//! Ogni connessione ammessa ha due task:
//! - `write_ws`: svuota la coda di uscita verso il socket e invia il close frame
//! - `listen_ws`: legge i frame del client e li smista agli handler

use crate::core::{AppState, WsError};
use crate::dtos::WsEventDTO;
use crate::ws::event_handlers::process_message;
use crate::ws::registry::{CloseReason, Connection, ConnectionStreams};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, instrument, warn};

/// Stato di una connessione: `Connecting → Authorized → Active → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Token verificato e membership confermata
    Authorized,
    /// Registrata nel Connection Registry
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid connection state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// Transizioni ammesse: un passo in avanti, oppure chiusura da qualsiasi
    /// stato aperto. Da `Closed` non si esce.
    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;
        match (self, to) {
            (Connecting, Authorized) | (Authorized, Active) => Ok(to),
            (Connecting | Authorized | Active, Closed) => Ok(to),
            _ => Err(InvalidTransition { from: self, to }),
        }
    }
}

/// Avvia una connessione già autorizzata.
/// Operazioni:
/// 1. Creare l'handle con la coda di uscita limitata
/// 2. Registrarlo nel Connection Registry (sostituisce un'eventuale connessione precedente)
/// 3. Avviare i task di scrittura e di lettura
#[instrument(skip(ws, state))]
pub async fn handle_socket(ws: WebSocket, state: Arc<AppState>, user_id: i32, chat_id: i32) {
    let lifecycle = ConnectionState::Authorized;
    let (connection, streams) = Connection::new(user_id, chat_id, state.ws_outbound_capacity);
    let (ws_tx, ws_rx) = ws.split();

    let lifecycle = match state.users_online.attach(connection.clone()) {
        Ok(previous) => {
            if let Some(old) = previous {
                debug!(old_connection = %old.id(), "Previous connection superseded");
            }
            match lifecycle.transition(ConnectionState::Active) {
                Ok(next) => next,
                Err(e) => {
                    error!("{}", e);
                    return;
                }
            }
        }
        Err(e) => {
            warn!("Attach failed: {}", e);
            connection.close(CloseReason::from_error(&e));
            // il task di scrittura invia comunque il close frame
            tokio::spawn(write_ws(ws_tx, streams, connection, state.ws_write_timeout));
            return;
        }
    };
    info!(connection_id = %connection.id(), state = ?lifecycle, "WebSocket connection established");

    tokio::spawn(write_ws(ws_tx, streams, connection.clone(), state.ws_write_timeout));
    tokio::spawn(listen_ws(ws_rx, connection, state, lifecycle));
}

/// Task di scrittura: unico proprietario della metà in uscita del socket.
///
/// Ogni scrittura è limitata da `write_timeout`: un client che smette di
/// leggere non trattiene il task oltre quel limite. Se la scrittura fallisce
/// la connessione viene chiusa, così anche il task di lettura termina.
#[instrument(skip_all, fields(user_id = connection.user_id()))]
pub async fn write_ws(
    mut websocket_tx: SplitSink<WebSocket, Message>,
    streams: ConnectionStreams,
    connection: Connection,
    write_timeout: Duration,
) {
    let ConnectionStreams {
        mut outbound,
        mut shutdown,
    } = streams;

    // chiusura già segnalata prima dell'avvio del task
    let pending = shutdown.borrow_and_update().clone();
    if let Some(reason) = pending {
        send_close(&mut websocket_tx, &reason, write_timeout).await;
        return;
    }

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                let reason = match changed {
                    Ok(()) => shutdown.borrow_and_update().clone(),
                    Err(_) => Some(CloseReason::ClientGone),
                };
                if let Some(reason) = reason {
                    send_close(&mut websocket_tx, &reason, write_timeout).await;
                    break;
                }
            }

            event = outbound.recv() => {
                let Some(event) = event else {
                    info!("Outbound queue closed");
                    break;
                };
                if let Err(e) = send_event(&mut websocket_tx, &event, write_timeout).await {
                    warn!("Failed to send event, closing connection: {}", e);
                    connection.close(CloseReason::ClientGone);
                    break;
                }
            }
        }
    }

    info!("Write task terminated");
}

#[derive(Debug, Error)]
enum SendError {
    #[error("write timed out")]
    TimedOut,
    #[error(transparent)]
    Socket(#[from] axum::Error),
}

async fn send_bounded(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_timeout: Duration,
) -> Result<(), SendError> {
    timeout(write_timeout, websocket_tx.send(message))
        .await
        .map_err(|_| SendError::TimedOut)?
        .map_err(SendError::from)
}

async fn send_event(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    event: &WsEventDTO,
    write_timeout: Duration,
) -> Result<(), SendError> {
    let json = serde_json::to_string(event).map_err(|e| {
        error!("Failed to serialize event: {:?}", e);
        axum::Error::new(e)
    })?;
    send_bounded(websocket_tx, Message::Text(Utf8Bytes::from(json)), write_timeout).await
}

async fn send_close(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    reason: &CloseReason,
    write_timeout: Duration,
) {
    let Some(frame) = reason.close_frame() else {
        debug!("Client gone, no close frame");
        return;
    };
    info!(code = frame.code, reason = %frame.reason.as_str(), "Sending close frame");
    if let Err(e) = send_bounded(websocket_tx, Message::Close(Some(frame)), write_timeout).await {
        debug!("Failed to send close frame: {}", e);
    }
}

/// Task di lettura: termina alla chiusura del client, su violazione di
/// protocollo, per inattività o quando la connessione viene sostituita.
#[instrument(skip_all, fields(user_id = connection.user_id(), chat_id = connection.chat_id()))]
pub async fn listen_ws(
    mut websocket_rx: SplitStream<WebSocket>,
    connection: Connection,
    state: Arc<AppState>,
    lifecycle: ConnectionState,
) {
    info!("Listen task started");

    let mut shutdown = connection.subscribe_shutdown();
    let idle_timeout = state.ws_idle_timeout;

    let reason = loop {
        // sostituita o chiusa mentre si elaborava il frame precedente
        if let Some(reason) = connection.close_reason() {
            break reason;
        }

        // solo la lettura dal socket compete con il segnale di chiusura:
        // l'elaborazione di un frame non viene mai interrotta a metà
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                debug!("Close signal received");
                break connection.close_reason().unwrap_or(CloseReason::ClientGone);
            }
            read = timeout(idle_timeout, websocket_rx.next()) => read,
        };

        let msg = match frame {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                warn!("WebSocket error: {:?}", e);
                break CloseReason::ClientGone;
            }
            Ok(None) => {
                info!("WebSocket stream ended");
                break CloseReason::ClientGone;
            }
            Err(_) => {
                warn!(timeout_secs = idle_timeout.as_secs(), "Connection idle timeout");
                break CloseReason::IdleTimeout;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) = process_message(&state, &connection, text.as_str()).await {
                    if e.close_code().is_some() {
                        warn!("Closing connection: {}", e);
                        break CloseReason::from_error(&e);
                    }
                    report_error(&connection, &e);
                }
            }
            Message::Binary(_) => {
                warn!("Binary frame received");
                break CloseReason::PolicyViolation("binary frames are not supported".to_string());
            }
            Message::Close(_) => {
                info!("Close message received");
                break CloseReason::ClientGone;
            }
            // ping/pong gestiti da axum
            _ => {}
        }
    };

    // Cleanup
    connection.close(reason.clone());
    let removed = state
        .users_online
        .detach_connection(connection.user_id(), connection.id());
    match lifecycle.transition(ConnectionState::Closed) {
        Ok(closed) => info!(?reason, removed, state = ?closed, "Listen task terminated"),
        Err(e) => error!("{}", e),
    }
}

/// Notifica un errore non fatale alla sola connessione che l'ha causato
fn report_error(connection: &Connection, err: &WsError) {
    warn!("Operation failed: {}", err);
    let event = WsEventDTO::Error {
        code: err.event_code(),
        message: err.to_string(),
    };
    if connection.push(Arc::new(event)).is_err() {
        debug!("Error event not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        let state = Connecting.transition(Authorized).unwrap();
        let state = state.transition(Active).unwrap();
        let state = state.transition(Closed).unwrap();
        assert_eq!(state, Closed);
    }

    #[test]
    fn any_open_state_can_close() {
        assert_eq!(Connecting.transition(Closed), Ok(Closed));
        assert_eq!(Authorized.transition(Closed), Ok(Closed));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        assert!(Connecting.transition(Active).is_err(), "Attach requires authorization");
        assert!(Active.transition(Authorized).is_err());
        for next in [Connecting, Authorized, Active, Closed] {
            assert_eq!(
                Closed.transition(next),
                Err(InvalidTransition { from: Closed, to: next })
            );
        }
    }
}
