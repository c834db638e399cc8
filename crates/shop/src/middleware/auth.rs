//! Bearer token authentication for the JSON API.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;

use crate::state::AppState;

/// Extractor that requires `Authorization: Bearer <ADMIN_API_TOKEN>`.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(_auth: RequireApiToken) -> impl IntoResponse {
///     "ok"
/// }
/// ```
pub struct RequireApiToken;

/// Rejection when the token is missing or wrong.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiTokenRejection {
    Missing,
    Invalid,
}

impl IntoResponse for ApiTokenRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => "missing bearer token",
            Self::Invalid => "invalid bearer token",
        };
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            message,
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for RequireApiToken {
    type Rejection = ApiTokenRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiTokenRejection::Missing)?;

        if constant_time_eq(token.as_bytes(), state.config().api_token.expose_secret().as_bytes()) {
            Ok(Self)
        } else {
            tracing::warn!(path = %parts.uri.path(), "Rejected API token");
            Err(ApiTokenRejection::Invalid)
        }
    }
}

/// Token of an `Authorization: Bearer` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
    }

    #[test]
    fn test_rejection_is_unauthorized() {
        let response = ApiTokenRejection::Invalid.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
