//! DTOs module - Data Transfer Objects
//!
//! DTO scambiati col client sul WebSocket. Separano il formato del protocollo
//! (frame JSON) dalla rappresentazione interna (entities).

pub mod message;
pub mod ws_event;

// Re-exports per facilitare l'import
pub use message::{CreateMessageDTO, MessageDTO, ReadByDTO, ReadNotificationDTO};
pub use ws_event::{ClientEventDTO, WsEventDTO};
