use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::Message;
use crate::users::repo_types::User;

/// Someone the caller may message.
#[derive(Debug, Serialize)]
pub struct ChatPartner {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub avatar: Option<String>,
    pub group: Option<String>,
}

impl From<User> for ChatPartner {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            fullname: u.fullname,
            username: u.username,
            avatar: u.avatar,
            group: u.group_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub message: Message,
    /// `None` once the sender's account is gone.
    pub sender_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: Uuid,
    #[serde(default)]
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMealRequest {
    pub to: Uuid,
    #[serde(alias = "imageBase64")]
    pub image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct SendMealResponse {
    pub message: Message,
    pub ai_reply: Message,
}
