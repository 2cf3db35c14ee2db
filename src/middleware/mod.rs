use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use crate::error::AppError;

/// The authenticated principal of the current request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub is_staff: bool,
}

/// An [`AuthUser`] that also holds staff privilege.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

/// Pulls the token key out of `Authorization: Bearer <key>` or
/// `Authorization: Token <key>`.
pub fn token_from_header(value: &str) -> Option<&str> {
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next()?;
    let key = parts.next()?.trim();
    let known = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
    if !known || key.is_empty() || key.contains(' ') {
        return None;
    }
    Some(key)
}

// Bearer token extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let key = token_from_header(header_value)
            .ok_or_else(|| AppError::Unauthorized("Invalid token header.".to_string()))?;

        let user = state
            .store
            .user_for_token(key)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid token.".to_string()))?;

        Ok(AuthUser {
            user_id: user.id,
            username: user.username,
            is_staff: user.is_staff,
        })
    }
}

impl FromRequestParts<Arc<crate::AppState>> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(AppError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ));
        }
        Ok(StaffUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_and_token_schemes() {
        assert_eq!(token_from_header("Bearer abc123"), Some("abc123"));
        assert_eq!(token_from_header("Token abc123"), Some("abc123"));
        assert_eq!(token_from_header("bearer   abc123 "), Some("abc123"));
    }

    #[test]
    fn rejects_other_headers() {
        assert_eq!(token_from_header("Basic dXNlcjpwYXNz"), None);
        assert_eq!(token_from_header("Bearer"), None);
        assert_eq!(token_from_header("Bearer "), None);
        assert_eq!(token_from_header("Bearer a b"), None);
        assert_eq!(token_from_header(""), None);
    }
}
