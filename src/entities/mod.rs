//! Entities module - Entità del dominio applicativo
//!
//! Entità persistite dallo store esterno (chat, messaggi, conferme di lettura)
//! e identità dell'utente verificata dal servizio di autenticazione.

pub mod chat;
pub mod enums;
pub mod message;
pub mod user;

// Re-exports per facilitare l'import
pub use chat::ChatMembership;
pub use enums::ChatType;
pub use message::{Message, ReadReceipt};
pub use user::UserIdentity;
