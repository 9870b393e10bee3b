use crate::core::auth::AuthError;
use crate::repositories::StoreError;
use axum::extract::ws::close_code;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

/// Errori del sottosistema di messaggistica live.
///
/// Alcuni chiudono la connessione (`close_code` restituisce un codice),
/// gli altri fanno fallire solo l'operazione corrente e vengono notificati
/// al client con un evento `error`.
#[derive(Debug, Error)]
pub enum WsError {
    /// Token scaduto, non valido o del tipo sbagliato
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Utente autenticato ma non membro della chat
    #[error("user is not a member of this chat")]
    AccessDenied,

    /// Frame malformato, tipo sconosciuto o campo obbligatorio mancante
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("resource not found")]
    NotFound,

    /// Attach richiesto con un handle di connessione già chiuso
    #[error("connection handle is already closed")]
    InvalidConnection,

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl WsError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Codice di chiusura WebSocket, `None` se la connessione deve restare aperta
    pub fn close_code(&self) -> Option<u16> {
        match self {
            WsError::Auth(_) | WsError::AccessDenied | WsError::Protocol(_) => {
                Some(close_code::POLICY)
            }
            WsError::InvalidConnection => Some(close_code::ERROR),
            WsError::NotFound | WsError::Store(_) => None,
        }
    }

    /// Codice (stile HTTP) riportato negli eventi `error` inviati al client
    pub fn event_code(&self) -> u16 {
        let status = match self {
            WsError::Auth(_) => StatusCode::UNAUTHORIZED,
            WsError::AccessDenied => StatusCode::FORBIDDEN,
            WsError::Protocol(_) => StatusCode::BAD_REQUEST,
            WsError::NotFound => StatusCode::NOT_FOUND,
            WsError::InvalidConnection => StatusCode::CONFLICT,
            WsError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            WsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.as_u16()
    }
}

impl From<StoreError> for WsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => WsError::NotFound,
            other => WsError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for WsError {
    fn from(err: validator::ValidationErrors) -> Self {
        WsError::Protocol(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Errore delle route HTTP, serializzato come `{ "error": ..., "details": ... }`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: &'static str,
    details: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            message,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn internal_server_error(message: &'static str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: &'static str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_)
            | StoreError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
                Self::service_unavailable("Store unavailable").with_details(err.to_string())
            }
            _ => Self::internal_server_error("Internal server error").with_details(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outages_map_to_service_unavailable() {
        let err = AppError::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::from(StoreError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn other_store_errors_map_to_internal_error() {
        let err = AppError::from(StoreError::Corrupted("bad uuid".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::from(StoreError::Database(sqlx::Error::RowNotFound));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ws_errors_close_only_on_policy_violations() {
        assert_eq!(WsError::AccessDenied.close_code(), Some(close_code::POLICY));
        assert_eq!(WsError::protocol("bad frame").close_code(), Some(close_code::POLICY));
        assert_eq!(WsError::NotFound.close_code(), None);
        assert!(matches!(WsError::from(StoreError::NotFound), WsError::NotFound));
    }
}
