//! Access Guard - Verifica della membership prima dell'ammissione

use crate::core::WsError;
use crate::repositories::ChatStore;
use tracing::{info, instrument, warn};

/// Verifica che l'utente sia membro (durevole) della chat.
///
/// Va chiamata una volta per tentativo di connessione, prima dell'attach.
/// Una chat inesistente equivale a un accesso negato.
#[instrument(skip(store))]
pub async fn authorize(store: &dyn ChatStore, chat_id: i32, user_id: i32) -> Result<(), WsError> {
    let membership = store.get_chat_membership(chat_id).await?;

    match membership {
        Some(chat) if chat.contains(user_id) => {
            info!(is_group = chat.is_group(), "User verified as member of chat");
            Ok(())
        }
        Some(_) => {
            warn!("User is not a member of chat");
            Err(WsError::AccessDenied)
        }
        None => {
            warn!("Chat does not exist");
            Err(WsError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ChatType;
    use crate::repositories::MemoryChatStore;

    #[tokio::test]
    async fn members_pass_and_strangers_are_denied() {
        let store = MemoryChatStore::new();
        let chat_id = store.create_chat(ChatType::Group, vec![1, 2]);

        assert!(authorize(&store, chat_id, 1).await.is_ok());
        assert!(matches!(authorize(&store, chat_id, 7).await, Err(WsError::AccessDenied)));
        assert!(matches!(authorize(&store, 999, 1).await, Err(WsError::AccessDenied)));
    }

    #[tokio::test]
    async fn store_failure_is_not_reported_as_denial() {
        let store = MemoryChatStore::new();
        let chat_id = store.create_chat(ChatType::Group, vec![1, 2]);
        store.set_available(false);

        assert!(matches!(authorize(&store, chat_id, 1).await, Err(WsError::Store(_))));
    }
}
