use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;
use uuid::Uuid;

use super::tokens::{JwtKeys, TokenKind};
use crate::{
    error::AppError,
    groups::repo_types::Capability,
    state::AppState,
    users::repo_types::User,
};

/// Legacy header some clients still send the caller token in.
pub const USER_HEADER: &str = "x-user-id";

/// Caller token from `Authorization: Bearer ..`, else from `x-user-id`.
/// Empty values and the literal `null` count as absent.
pub(crate) fn caller_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
                .unwrap_or(v)
        });
    let legacy = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());

    [bearer, legacy]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty() && *t != "null" && *t != "undefined")
}

/// Verified caller id taken from an access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = caller_token(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token, TokenKind::Access).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::Unauthenticated
        })?;

        Ok(AuthUser(claims.sub))
    }
}

/// Caller loaded from the store; a deleted account no longer authenticates.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        let user = state
            .users
            .find_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        Ok(CurrentUser(user))
    }
}

/// Caller holding `Capability::Administer`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.can(Capability::Administer) {
            warn!(user_id = %user.id, "admin route refused");
            return Err(AppError::Forbidden("Administrators only".into()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn bearer_header_wins() {
        let h = headers(&[("authorization", "Bearer abc"), (USER_HEADER, "legacy")]);
        assert_eq!(caller_token(&h), Some("abc"));
    }

    #[test]
    fn falls_back_to_legacy_header() {
        let h = headers(&[(USER_HEADER, "legacy")]);
        assert_eq!(caller_token(&h), Some("legacy"));
        let h = headers(&[("authorization", "Bearer null"), (USER_HEADER, "legacy")]);
        assert_eq!(caller_token(&h), Some("legacy"));
    }

    #[test]
    fn null_and_missing_are_absent() {
        assert_eq!(caller_token(&HeaderMap::new()), None);
        assert_eq!(caller_token(&headers(&[(USER_HEADER, "null")])), None);
        assert_eq!(caller_token(&headers(&[("authorization", "Bearer ")])), None);
    }
}
