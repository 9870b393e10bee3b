//! Enumerazioni - Tipi enumerati utilizzati nelle entità

use serde::{Deserialize, Serialize};

/// Chat personale (esattamente due partecipanti) o di gruppo
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Group,
    Personal,
}

impl From<bool> for ChatType {
    fn from(is_group: bool) -> Self {
        if is_group {
            ChatType::Group
        } else {
            ChatType::Personal
        }
    }
}
