use crate::handlers::auth::verify_jwt_token;
use crate::identity::{clean_user_key, Identity, UserKey};
use crate::models::auth::{Claims, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{Json, Response},
};
use std::sync::Arc;

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
}

pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| unauthorized("Invalid Authorization header format"))?;

    // Extract token from "Bearer <token>" format
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization header format. Expected 'Bearer <token>'"))?;

    let claims = match verify_jwt_token(token, &state.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("JWT verification failed: {}", e);
            return Err(unauthorized("Invalid or expired token"));
        }
    };

    let identity = identity_from_claims(claims).ok_or_else(|| {
        tracing::warn!("JWT carried an inconsistent identity");
        unauthorized("Invalid or expired token")
    })?;

    // Handlers pull the caller from request extensions
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Rebuilds the caller from verified claims. The user key is re-derived from
/// the email so a token can only ever address its own subtree.
pub fn identity_from_claims(claims: Claims) -> Option<Identity> {
    if claims.guest {
        let key = UserKey::from_trusted(claims.sub);
        return key.is_guest().then_some(Identity {
            key,
            email: None,
            name: None,
            picture: None,
        });
    }

    let email = claims.email?;
    let key = clean_user_key(&email).ok()?;
    if key.as_str() != claims.sub {
        return None;
    }
    Some(Identity {
        key,
        email: Some(email),
        name: claims.name,
        picture: claims.picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, email: Option<&str>, guest: bool) -> Claims {
        Claims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            name: None,
            picture: None,
            guest,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_identity_from_claims() {
        let user = identity_from_claims(claims("ana@example,com", Some("ana@example.com"), false)).unwrap();
        assert_eq!(user.key.as_str(), "ana@example,com");
        assert!(!user.is_guest());

        let guest = UserKey::new_guest();
        let id = identity_from_claims(claims(guest.as_str(), None, true)).unwrap();
        assert!(id.is_guest());
    }

    #[test]
    fn test_inconsistent_claims_rejected() {
        // Subject does not match the email it claims.
        assert!(identity_from_claims(claims("bob@example,com", Some("ana@example.com"), false)).is_none());
        // A guest token cannot address a real user's subtree.
        assert!(identity_from_claims(claims("ana@example,com", None, true)).is_none());
        assert!(identity_from_claims(claims("ana@example,com", None, false)).is_none());
    }
}
