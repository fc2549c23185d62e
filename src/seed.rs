//! Startup seeding: default groups and the coach bot, plus the admin reset.

use time::macros::date;
use tracing::info;

use crate::{
    auth::services::{hash_password, random_password},
    groups::repo_types::{Group, NewGroup, Permissions, Role},
    state::AppState,
    users::repo_types::{NewUser, User},
};

pub const ADMIN_GROUP: &str = "Administrators";
pub const MEMBER_GROUP: &str = "Members";
pub const BOT_FULLNAME: &str = "AI Coach";
pub const ADMIN_USERNAME: &str = "admin";

pub fn is_seeded_group(name: &str) -> bool {
    name == ADMIN_GROUP || name == MEMBER_GROUP
}

#[derive(Debug)]
pub struct Seeded {
    pub admin_group: Group,
    pub member_group: Group,
    pub bot: User,
}

/// Idempotent; safe to run on every start.
pub async fn ensure_defaults(state: &AppState) -> anyhow::Result<Seeded> {
    let admin_group = state
        .groups
        .ensure_group(&NewGroup {
            name: ADMIN_GROUP.into(),
            description: Some("System administrators".into()),
            role: Role::Administrator,
            permissions: Permissions::ALL,
        })
        .await?;
    let member_group = state
        .groups
        .ensure_group(&NewGroup {
            name: MEMBER_GROUP.into(),
            description: Some("Regular members".into()),
            role: Role::Member,
            permissions: Permissions::default(),
        })
        .await?;

    let bot = match find_bot(state).await? {
        Some(bot) => bot,
        None => {
            state
                .users
                .ensure_user(&NewUser {
                    username: state.config.bot_username.clone(),
                    password_hash: hash_password(&random_password())?,
                    fullname: BOT_FULLNAME.into(),
                    birthday: date!(2000 - 01 - 01),
                    height: 170.0,
                    gender: "other".into(),
                    group_id: Some(admin_group.id),
                })
                .await?
        }
    };

    info!(
        bot_id = %bot.id,
        admin_group = %admin_group.id,
        member_group = %member_group.id,
        "defaults ensured"
    );
    Ok(Seeded { admin_group, member_group, bot })
}

/// Recreate (or reset) the `admin` account with the configured password.
pub async fn reset_admin(state: &AppState) -> anyhow::Result<User> {
    let Seeded { admin_group, .. } = ensure_defaults(state).await?;
    let admin = state
        .users
        .upsert_user(&NewUser {
            username: ADMIN_USERNAME.into(),
            password_hash: hash_password(&state.config.admin_password)?,
            fullname: "Administrator".into(),
            birthday: date!(1990 - 01 - 01),
            height: 170.0,
            gender: "other".into(),
            group_id: Some(admin_group.id),
        })
        .await?;
    info!(user_id = %admin.id, "admin account reset");
    Ok(admin)
}

pub async fn find_bot(state: &AppState) -> anyhow::Result<Option<User>> {
    state
        .users
        .find_user_by_username(&state.config.bot_username)
        .await
}
