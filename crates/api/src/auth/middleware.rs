//! Auth middleware: user bearer tokens and the service-role key

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::jwt::JwtManager;
use crate::error::ApiError;

/// State the auth middleware needs, extractable from `AppState`
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
    pub service_role_key: String,
}

/// Authenticated caller, inserted as a request extension by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Require a valid platform-issued user token
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = auth.jwt.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        ApiError::Unauthorized
    })?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
        tracing::warn!(sub = %claims.sub, "Token subject is not a UUID");
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
    });
    Ok(next.run(request).await)
}

/// Require the service-role key, compared in constant time.
///
/// Used by the trial sweep trigger, which is called by infrastructure, not
/// by users.
pub async fn require_service_role(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let matches: bool = token
        .as_bytes()
        .ct_eq(auth.service_role_key.as_bytes())
        .into();
    if !matches {
        tracing::warn!("Service-role key mismatch");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::header::HeaderValue;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut request = Request::new(axum::body::Body::empty());
        if let Some(value) = value {
            request
                .headers_mut()
                .insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        request
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = request_with_auth(Some("Bearer abc123"));
        assert_eq!(bearer_token(&request), Some("abc123"));

        let request = request_with_auth(Some("Bearer   spaced  "));
        assert_eq!(bearer_token(&request), Some("spaced"));
    }

    #[test]
    fn test_missing_or_malformed_header_yields_none() {
        assert_eq!(bearer_token(&request_with_auth(None)), None);
        assert_eq!(bearer_token(&request_with_auth(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&request_with_auth(Some("Bearer "))), None);
        assert_eq!(bearer_token(&request_with_auth(Some("abc123"))), None);
    }
}
