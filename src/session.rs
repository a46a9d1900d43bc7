use serde::{Deserialize, Serialize};

/// Приглашение в комнату от лобби. Ядро его не хранит, только реагирует
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InviteSession {
    pub room_id: String,
    /// Кто пригласил; именно ему принявший отправляет offer
    pub from: String,
    pub to: String,
}

impl InviteSession {
    pub fn new(room_id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}
