use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use uuid::Uuid;

use crate::{
    auth::{
        dto::RegisterRequest,
        services::{hash_password, is_valid_username, normalize_username, MIN_PASSWORD_LEN},
    },
    error::{AppError, AppResult},
    users::repo_types::NewUser,
};

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Validate a registration payload and hash its password.
pub fn new_user_from(req: &RegisterRequest, group_id: Option<Uuid>) -> AppResult<NewUser> {
    let username = normalize_username(&req.username);
    if !is_valid_username(&username) {
        return Err(AppError::BadRequest(
            "Username must be 3-32 characters of letters, digits, '.', '_' or '-'".into(),
        ));
    }
    validate_password(&req.password)?;

    let fullname = req.fullname.trim();
    if fullname.is_empty() {
        return Err(AppError::BadRequest("Full name is required".into()));
    }
    let gender = req.gender.trim();
    if gender.is_empty() {
        return Err(AppError::BadRequest("Gender is required".into()));
    }
    let birthday = req
        .birthday
        .ok_or_else(|| AppError::BadRequest("Birthday is required".into()))?;
    let height = validate_height(req.height)?
        .ok_or_else(|| AppError::BadRequest("Height is required".into()))?;

    Ok(NewUser {
        username,
        password_hash: hash_password(&req.password)?,
        fullname: fullname.to_string(),
        birthday,
        height,
        gender: gender.to_string(),
        group_id,
    })
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_height(height: Option<f64>) -> AppResult<Option<f64>> {
    match height {
        None => Ok(None),
        Some(h) if h.is_finite() && h > 0.0 && h < 300.0 => Ok(Some(h)),
        Some(_) => Err(AppError::BadRequest("Height must be between 0 and 300 cm".into())),
    }
}

/// Trimmed, or `None` when blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Encode an uploaded image as a `data:` URL for storage on the user record.
pub fn avatar_data_url(content_type: &str, body: &Bytes) -> AppResult<String> {
    if !content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Avatar must be an image".into()));
    }
    if body.is_empty() {
        return Err(AppError::BadRequest("Avatar file is empty".into()));
    }
    if body.len() > MAX_AVATAR_BYTES {
        return Err(AppError::BadRequest("Avatar must be 2 MB or smaller".into()));
    }
    Ok(format!("data:{};base64,{}", content_type, STANDARD.encode(body)))
}
