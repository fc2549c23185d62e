use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Permissions, Role};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Serialize)]
pub struct DeletedGroupResponse {
    pub message: &'static str,
    pub id: Uuid,
}
