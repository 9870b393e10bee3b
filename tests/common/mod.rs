#![allow(dead_code)]

use axum_test::TestServer;
use futures_util::{SinkExt, StreamExt};
use messenger_server::core::{AppState, Config, TokenType, encode_jwt};
use messenger_server::repositories::MemoryChatStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Attesa massima per un frame o per un cambio di stato nei test
pub const WAIT: Duration = Duration::from_secs(3);

/// Configurazione di test con segreti fissi
pub fn test_config() -> Config {
    Config {
        jwt_secret: "ilmiobellissimosegretochevaassolutamentecambiato".to_string(),
        jwt_refresh_secret: "unaltrosegretoperirefreshtokendatest".to_string(),
        ..Config::default()
    }
}

/// Crea un AppState di test sopra uno store in memoria
///
/// # Returns
/// Lo stato condiviso e lo store, per preparare chat e simulare guasti
pub fn create_test_state() -> (Arc<AppState>, Arc<MemoryChatStore>) {
    create_test_state_with(test_config())
}

pub fn create_test_state_with(config: Config) -> (Arc<AppState>, Arc<MemoryChatStore>) {
    let store = Arc::new(MemoryChatStore::new());
    let state = Arc::new(AppState::new(store.clone(), &config));
    (state, store)
}

/// Crea un TestServer per le richieste HTTP
pub fn create_test_server(state: Arc<AppState>) -> TestServer {
    let app = messenger_server::create_router(state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Genera un access token valido per l'utente
pub fn access_token(state: &AppState, user_id: i32) -> String {
    encode_jwt(user_id, &format!("user{user_id}"), TokenType::Access, &state.jwt_keys)
        .expect("Failed to create JWT token")
}

/// Avvia il server su una porta libera e restituisce l'indirizzo
pub async fn spawn_server(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let app = messenger_server::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server crashed");
    });
    format!("ws://{addr}")
}

/// Apre una connessione WebSocket verso `/ws/{chat_id}` con il token in query
pub async fn connect(base: &str, chat_id: i32, token: &str) -> WsClient {
    let url = format!("{base}/ws/{chat_id}?token={token}");
    let (socket, _) = connect_async(url).await.expect("WebSocket handshake failed");
    socket
}

/// Connette l'utente e attende che la connessione sia registrata
pub async fn connect_user(base: &str, state: &AppState, chat_id: i32, user_id: i32) -> WsClient {
    let socket = connect(base, chat_id, &access_token(state, user_id)).await;
    wait_until(|| state.users_online.is_user_online(user_id)).await;
    socket
}

/// L'handshake termina prima che `on_upgrade` registri la connessione:
/// i test attendono qui invece di dormire un tempo fisso
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not met in time");
}

pub async fn send_json(socket: &mut WsClient, value: serde_json::Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Prossimo frame testuale decodificato come JSON (ping/pong ignorati)
pub async fn next_json(socket: &mut WsClient) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("No frame received in time")
            .expect("Stream ended")
            .expect("WebSocket error");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Frame is not JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got {other:?}"),
        }
    }
}

/// Attende il close frame e ne restituisce il codice
pub async fn next_close_code(socket: &mut WsClient) -> u16 {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("No close frame received in time");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => return u16::from(close.code),
            Some(Ok(Message::Close(None))) => panic!("Close frame without code"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("WebSocket error before close frame: {e:?}"),
            None => panic!("Stream ended without close frame"),
        }
    }
}

/// Verifica che non arrivi nessun frame testuale entro `within`
pub async fn assert_silent(socket: &mut WsClient, within: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(within, socket.next()).await {
        panic!("Unexpected frame: {text}");
    }
}
