//! User entity - Identità verificata dell'utente

use serde::{Deserialize, Serialize};

/// Identità prodotta dalla verifica del bearer token.
/// Le password e l'anagrafica restano al servizio utenti.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: i32,
    pub username: String,
}
