//! Membership Cache - Sottoscrizioni live utente → chat
//!
//! Distinta dalla membership durevole dello store: contiene solo le chat per
//! cui un utente connesso riceve consegne in tempo reale. Viene ricostruita a
//! ogni attach e scartata al detach, entrambi eseguiti dal `ConnectionRegistry`.

use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, instrument};

pub struct MembershipCache {
    /// Key: user_id, Value: chat_id a cui l'utente è sottoscritto
    subscriptions: DashMap<i32, HashSet<i32>>,
}

impl Default for MembershipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipCache {
    pub fn new() -> Self {
        MembershipCache {
            subscriptions: DashMap::new(),
        }
    }

    /// Riparte da zero con la sola chat indirizzata dalla connessione
    pub(crate) fn reset(&self, user_id: i32, chat_id: i32) {
        self.subscriptions.insert(user_id, HashSet::from([chat_id]));
    }

    /// Rimuove tutte le sottoscrizioni dell'utente
    pub(crate) fn clear(&self, user_id: i32) -> usize {
        self.subscriptions
            .remove(&user_id)
            .map(|(_, rooms)| rooms.len())
            .unwrap_or(0)
    }

    /// Aggiunge una chat alle sottoscrizioni di un utente con sessione live.
    ///
    /// Il chiamante deve aver già superato l'Access Guard per questa chat
    /// (vedi `ws::join_room`). Senza sessione live non fa nulla e restituisce `false`.
    #[instrument(skip(self))]
    pub(crate) fn join(&self, user_id: i32, chat_id: i32) -> bool {
        match self.subscriptions.get_mut(&user_id) {
            Some(mut rooms) => {
                rooms.insert(chat_id);
                true
            }
            None => {
                debug!("User has no live session, join ignored");
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub fn leave(&self, user_id: i32, chat_id: i32) -> bool {
        self.subscriptions
            .get_mut(&user_id)
            .map(|mut rooms| rooms.remove(&chat_id))
            .unwrap_or(false)
    }

    pub fn is_member(&self, user_id: i32, chat_id: i32) -> bool {
        self.subscriptions
            .get(&user_id)
            .map(|rooms| rooms.contains(&chat_id))
            .unwrap_or(false)
    }

    /// Utenti sottoscritti alla chat. Scansione lineare: il numero di utenti
    /// connessi contemporaneamente a un singolo nodo resta contenuto.
    pub fn members_of(&self, chat_id: i32) -> Vec<i32> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.value().contains(&chat_id))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn rooms_of(&self, user_id: i32) -> Vec<i32> {
        self.subscriptions
            .get(&user_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_requires_a_live_session() {
        let cache = MembershipCache::new();
        assert!(!cache.join(1, 10), "No session, join must be ignored");
        assert!(!cache.is_member(1, 10));

        cache.reset(1, 10);
        assert!(cache.join(1, 11));
        let mut rooms = cache.rooms_of(1);
        rooms.sort();
        assert_eq!(rooms, vec![10, 11]);
    }

    #[test]
    fn reset_discards_previous_rooms() {
        let cache = MembershipCache::new();
        cache.reset(1, 10);
        cache.join(1, 11);
        cache.reset(1, 12);
        assert_eq!(cache.rooms_of(1), vec![12]);
    }

    #[test]
    fn members_of_scans_every_user() {
        let cache = MembershipCache::new();
        cache.reset(1, 5);
        cache.reset(2, 5);
        cache.reset(3, 6);

        let mut members = cache.members_of(5);
        members.sort();
        assert_eq!(members, vec![1, 2]);

        assert!(cache.leave(2, 5));
        assert!(!cache.leave(2, 5), "Second leave is a no-op");
        assert_eq!(cache.members_of(5), vec![1]);
    }

    #[test]
    fn clear_removes_all_rooms_of_user() {
        let cache = MembershipCache::new();
        cache.reset(1, 5);
        cache.join(1, 6);
        assert_eq!(cache.clear(1), 2);
        assert_eq!(cache.clear(1), 0);
        assert!(cache.members_of(5).is_empty());
        assert!(cache.members_of(6).is_empty());
    }
}
