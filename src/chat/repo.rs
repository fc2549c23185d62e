use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{ConversationFilter, Message, NewMessage, Page};
use crate::db::PgStore;

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn insert_message(&self, message: &NewMessage) -> anyhow::Result<Message>;
    /// Messages matching `filter`, newest first.
    async fn conversation(
        &self,
        filter: &ConversationFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Message>>;
}

#[async_trait]
impl MessageRepo for PgStore {
    async fn insert_message(&self, message: &NewMessage) -> anyhow::Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, content, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sender_id, recipient_id, content, image, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(&message.content)
        .bind(&message.image)
        .fetch_one(&self.db)
        .await
        .context("insert message")?;
        Ok(row)
    }

    async fn conversation(
        &self,
        filter: &ConversationFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Message>> {
        // $3 is NULL when no bot exists; `sender_id = NULL` never matches.
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, recipient_id, content, image, created_at
              FROM messages
             WHERE (sender_id = $1 AND recipient_id = $2)
                OR (sender_id = $2 AND recipient_id = $1)
                OR (sender_id = $3 AND recipient_id IN ($1, $2))
             ORDER BY created_at DESC, id DESC
             LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.a)
        .bind(filter.b)
        .bind(filter.bot)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .context("load conversation")?;
        Ok(rows)
    }
}
