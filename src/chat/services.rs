use std::collections::HashMap;

use tracing::error;
use uuid::Uuid;

use super::{
    dto::HistoryItem,
    repo_types::{ConversationFilter, Page},
};
use crate::{
    ai::{generate_with_fallback, GenerateRequest, InlineImage},
    error::COACH_BUSY_REPLY,
    groups::repo_types::Capability,
    metrics::repo_types::BodyMetric,
    seed,
    state::AppState,
    users::repo_types::User,
};

/// Placeholder content of a message that only carries a meal photo.
pub const MEAL_PHOTO_CONTENT: &str = "[Meal photo]";

/// Whether `sender` may start or continue a conversation with `partner`.
pub fn can_message(sender: &User, partner: &User, bot_id: Option<Uuid>) -> bool {
    sender.can(Capability::Message) || partner.is_admin() || bot_id == Some(partner.id)
}

/// Conversation between `requester` and `partner`, newest first, including
/// coach replies addressed to either of them.
pub async fn history(
    state: &AppState,
    requester: Uuid,
    partner: Uuid,
    page: Page,
) -> anyhow::Result<Vec<HistoryItem>> {
    let bot = seed::find_bot(state).await?.map(|b| b.id);
    let filter = ConversationFilter { a: requester, b: partner, bot };
    let messages = state.messages.conversation(&filter, page.clamped()).await?;

    let mut names: HashMap<Uuid, Option<String>> = HashMap::new();
    let mut items = Vec::with_capacity(messages.len());
    for message in messages {
        let sender_name = match names.get(&message.sender_id) {
            Some(name) => name.clone(),
            None => {
                let name = state.users.find_user(message.sender_id).await?.map(|u| u.fullname);
                names.insert(message.sender_id, name.clone());
                name
            }
        };
        items.push(HistoryItem { message, sender_name });
    }
    Ok(items)
}

/// Prompt for judging a meal photo against the sender's latest body metrics.
pub fn meal_prompt(sender: &User, latest: Option<&BodyMetric>) -> String {
    let mut stats = Vec::new();
    if let Some(m) = latest {
        if let Some(w) = m.measurements.weight_kg {
            stats.push(format!("weight {w} kg"));
        }
        if let Some(f) = m.measurements.body_fat_pct {
            stats.push(format!("body fat {f}%"));
        }
    }
    let stats = if stats.is_empty() {
        "no recorded measurements".to_string()
    } else {
        stats.join(", ")
    };

    format!(
        "You are a nutrition coach. {name} ({stats}) sent a photo of a meal. \
         Identify the foods, estimate calories and macronutrients, and give short, \
         practical advice for this person. Reply in plain text.",
        name = sender.fullname,
    )
}

/// Ask the AI coach about a meal photo; any failure becomes the busy reply.
pub async fn coach_reply(state: &AppState, sender: &User, image_payload: &str) -> String {
    let latest = match state.metrics.latest_metrics(sender.id, 1).await {
        Ok(mut rows) => rows.pop(),
        Err(e) => {
            error!(user_id = %sender.id, error = ?e, "loading latest metric failed");
            None
        }
    };

    let request = GenerateRequest {
        prompt: meal_prompt(sender, latest.as_ref()),
        image: Some(InlineImage::from_client_payload(image_payload)),
    };
    match generate_with_fallback(state.ai.as_ref(), &state.config.ai.models, &request).await {
        Ok(generated) => generated.text,
        Err(e) => {
            error!(user_id = %sender.id, error = %e, "coach reply failed");
            COACH_BUSY_REPLY.to_string()
        }
    }
}
