//! Core Module - Componenti infrastrutturali dell'applicazione
//!
//! Questo modulo contiene tutti i componenti "core" dell'applicazione:
//! - Verifica ed emissione dei token JWT
//! - Configurazione
//! - Gestione errori
//! - Stato applicazione

pub mod auth;
pub mod config;
pub mod error;
pub mod state;

// Re-exports per facilitare l'import
pub use auth::{AuthError, Claims, JwtKeys, TokenType, encode_jwt, verify_token};
pub use config::Config;
pub use error::{AppError, WsError};
pub use state::AppState;
