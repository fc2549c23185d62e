use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::groups::repo_types::{Capability, Permissions, Role};

/// User record joined with the capability data of its group.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String, // argon2 PHC string, never exposed in JSON
    pub fullname: String,
    #[serde(with = "crate::dates")]
    pub birthday: Date,
    pub height: f64,
    pub gender: String,
    pub avatar: Option<String>,
    pub group_id: Option<Uuid>,
    pub group_name: Option<String>,
    pub role: Role,
    pub permissions: Permissions,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// The password hash and avatar data URL stay out of logs and spans.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("fullname", &self.fullname)
            .field("birthday", &self.birthday)
            .field("height", &self.height)
            .field("gender", &self.gender)
            .field("avatar", &self.avatar.as_ref().map(|a| format!("<{} bytes>", a.len())))
            .field("group_id", &self.group_id)
            .field("group_name", &self.group_name)
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl User {
    pub fn can(&self, capability: Capability) -> bool {
        capability.granted(self.role, self.permissions)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub fullname: String,
    pub birthday: Date,
    pub height: f64,
    pub gender: String,
    pub avatar: Option<String>,
    pub group_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub group_name: Option<String>,
    pub group_role: Option<String>,
    pub perm_note: Option<bool>,
    pub perm_message: Option<bool>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            password_hash: r.password_hash,
            fullname: r.fullname,
            birthday: r.birthday,
            height: r.height,
            gender: r.gender,
            avatar: r.avatar,
            group_id: r.group_id,
            group_name: r.group_name,
            role: r.group_role.as_deref().map(Role::parse).unwrap_or_default(),
            permissions: Permissions {
                note: r.perm_note.unwrap_or(false),
                message: r.perm_message.unwrap_or(false),
            },
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub fullname: String,
    pub birthday: Date,
    pub height: f64,
    pub gender: String,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub fullname: Option<String>,
    pub birthday: Option<Date>,
    pub height: Option<f64>,
    pub gender: Option<String>,
    pub group_id: Option<Uuid>,
}
