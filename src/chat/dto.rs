use serde::Deserialize;

use crate::models::ChatIdentity;

/// Subset of a Telegram `Update` the webhook cares about.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Message {
    pub fn identity(&self) -> ChatIdentity {
        let sender = self.from.as_ref();
        ChatIdentity {
            chat_id: self.chat.id,
            username: sender.and_then(|s| s.username.clone()),
            first_name: sender.and_then(|s| s.first_name.clone()),
            last_name: sender.and_then(|s| s.last_name.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
}
