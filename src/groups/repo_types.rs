use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role carried by a group and, through membership, by every user in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    #[default]
    Member,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Member => "member",
        }
    }

    /// Unknown values degrade to `Member`.
    pub fn parse(s: &str) -> Self {
        match s {
            "administrator" => Self::Administrator,
            _ => Self::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Permissions {
    /// May annotate other users' body metrics.
    #[serde(default)]
    pub note: bool,
    /// May message any user, not only administrators and the coach.
    #[serde(default)]
    pub message: bool,
}

impl Permissions {
    pub const ALL: Self = Self { note: true, message: true };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Administer,
    Message,
    Annotate,
}

impl Capability {
    pub fn granted(self, role: Role, permissions: Permissions) -> bool {
        if role == Role::Administrator {
            return true;
        }
        match self {
            Self::Administer => false,
            Self::Message => permissions.message,
            Self::Annotate => permissions.note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: Role,
    pub permissions: Permissions,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct GroupRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: String,
    pub perm_note: bool,
    pub perm_message: bool,
    pub created_at: OffsetDateTime,
}

impl From<GroupRow> for Group {
    fn from(r: GroupRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            role: Role::parse(&r.role),
            permissions: Permissions {
                note: r.perm_note,
                message: r.perm_message,
            },
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub role: Role,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Default)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Permissions>,
}
