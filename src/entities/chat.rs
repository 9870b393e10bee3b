//! Chat entity - Membership durevole di una chat

use super::enums::ChatType;
use serde::{Deserialize, Serialize};

/// Vista della chat restituita dallo store per il controllo degli accessi.
/// Rappresenta la membership durevole, non le sottoscrizioni live.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMembership {
    pub chat_id: i32,
    pub chat_type: ChatType,
    pub member_ids: Vec<i32>,
}

impl ChatMembership {
    pub fn is_group(&self) -> bool {
        self.chat_type == ChatType::Group
    }

    pub fn contains(&self, user_id: i32) -> bool {
        self.member_ids.contains(&user_id)
    }
}
