//! Application State - Stato dell'applicazione
//!
//! Costruito una sola volta all'avvio e condiviso come `Arc<AppState>` tra
//! tutte le route e i task delle connessioni. Nessuno stato globale.

use crate::core::auth::JwtKeys;
use crate::core::config::Config;
use crate::repositories::ChatStore;
use crate::ws::intake::DedupMarkers;
use crate::ws::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    /// Store persistente (MySQL o in memoria)
    pub store: Arc<dyn ChatStore>,

    /// Segreti per la verifica dei token
    pub jwt_keys: JwtKeys,

    /// Registro concorrente degli utenti online con la loro connessione WebSocket
    /// e le chat a cui sono sottoscritti
    pub users_online: ConnectionRegistry,

    /// Ultimo messaggio accettato per ogni chat, per scartare i retry duplicati
    pub dedup: DedupMarkers,

    /// Capacità della coda di uscita di ogni connessione
    pub ws_outbound_capacity: usize,

    /// Silenzio massimo del client prima della chiusura
    pub ws_idle_timeout: Duration,

    /// Tempo massimo di una singola scrittura sul socket
    pub ws_write_timeout: Duration,
}

impl AppState {
    /// Crea una nuova istanza di AppState
    ///
    /// # Arguments
    /// * `store` - Store condiviso da tutte le connessioni
    /// * `config` - Configurazione caricata all'avvio
    pub fn new(store: Arc<dyn ChatStore>, config: &Config) -> Self {
        Self {
            store,
            jwt_keys: JwtKeys::new(config.jwt_secret.clone(), config.jwt_refresh_secret.clone()),
            users_online: ConnectionRegistry::new(),
            dedup: DedupMarkers::new(),
            ws_outbound_capacity: config.ws_outbound_capacity,
            ws_idle_timeout: Duration::from_secs(config.ws_idle_timeout_secs),
            ws_write_timeout: Duration::from_secs(config.ws_write_timeout_secs),
        }
    }
}
