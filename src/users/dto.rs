use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::auth::dto::RegisterRequest;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub fullname: Option<String>,
    #[serde(default, with = "crate::dates::option")]
    pub birthday: Option<Date>,
    pub height: Option<f64>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreateUserRequest {
    #[serde(flatten)]
    pub user: RegisterRequest,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateUserRequest {
    #[serde(flatten)]
    pub profile: UpdateProfileRequest,
    pub group_id: Option<Uuid>,
    /// Replaces the password when present.
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
    pub id: Uuid,
}
