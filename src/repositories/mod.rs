//! Repositories module - Accesso allo store persistente
//!
//! Il core di messaggistica parla con la persistenza solo tramite il trait
//! `ChatStore`. Due implementazioni:
//! - `MySqlChatStore`: database MySQL tramite sqlx
//! - `MemoryChatStore`: mappe in memoria, per i test e per l'avvio senza database

pub mod memory;
pub mod mysql;
pub mod traits;

// Re-esportazione dei tipi per facilitare l'import
pub use memory::MemoryChatStore;
pub use mysql::MySqlChatStore;
pub use traits::{ChatStore, StoreError};
