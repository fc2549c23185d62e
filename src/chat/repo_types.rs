use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub image: Option<String>,
}

/// Messages visible in the conversation between `a` and `b`.
///
/// Coach replies are addressed to whoever sent the photo, not to the chat
/// partner, so the bot's messages to either participant belong to the
/// conversation as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationFilter {
    pub a: Uuid,
    pub b: Uuid,
    pub bot: Option<Uuid>,
}

impl ConversationFilter {
    pub fn matches(&self, m: &Message) -> bool {
        let direct = (m.sender_id == self.a && m.recipient_id == self.b)
            || (m.sender_id == self.b && m.recipient_id == self.a);
        let from_bot = self.bot == Some(m.sender_id)
            && (m.recipient_id == self.a || m.recipient_id == self.b);
        direct || from_bot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub const MAX_PAGE: i64 = 200;

fn default_limit() -> i64 {
    50
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

impl Page {
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_PAGE),
            offset: self.offset.max(0),
        }
    }
}
