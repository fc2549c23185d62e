use serde::{Deserialize, Serialize};
use time::Date;

use super::tokens::TokenPair;
use crate::users::repo_types::User;

/// Request body for user registration. Fields are optional so that missing
/// ones produce a readable validation message instead of a decode error.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default, with = "crate::dates::option")]
    pub birthday: Option<Date>,
    pub height: Option<f64>,
    #[serde(default)]
    pub gender: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login and refresh answer: both tokens at the top level, plus the user.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub message: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
