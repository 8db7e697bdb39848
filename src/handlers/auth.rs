use crate::error::AppError;
use crate::google_oauth::{decode_state, encode_state, OAuthError};
use crate::identity::Identity;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::{Claims, Profile, SessionResponse};
use crate::services::{ConversationStore, SessionStore};
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post, Router},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const LOGIN_START: &str = "/api/auth/google";
const USER_SESSION_DAYS: i64 = 30;
const GUEST_SESSION_HOURS: i64 = 24;

pub fn auth_routes() -> Router {
    let public_routes = Router::new()
        .route("/api/auth/google", get(initiate_google_oauth))
        .route("/api/auth/google/callback", get(google_oauth_callback))
        .route("/api/auth/guest", post(guest_login));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route_layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

pub fn issue_token(identity: &Identity, secret: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: identity.key.to_string(),
        email: identity.email.clone(),
        name: identity.name.clone(),
        picture: identity.picture.clone(),
        guest: identity.is_guest(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn verify_jwt_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[derive(Deserialize)]
pub struct GoogleOAuthQuery {
    pub redirect_to: Option<String>,
}

#[derive(Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Initiate Google OAuth login
pub async fn initiate_google_oauth(
    Query(params): Query<GoogleOAuthQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Redirect, AppError> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Google OAuth not configured".to_string()))?;

    let redirect_to = params.redirect_to.unwrap_or_else(|| "/".to_string());
    let state_param = encode_state(&redirect_to, Utc::now().timestamp());

    tracing::info!("🔐 Initiating Google OAuth login");
    Ok(Redirect::to(&google.authorize_url(&state_param)))
}

/// Any failure sends the browser back to the start of the login flow.
pub async fn google_oauth_callback(
    Query(params): Query<GoogleCallbackQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match complete_google_login(params, &state).await {
        Ok(page) => page.into_response(),
        Err(e) => {
            tracing::warn!("Google login failed: {}", e);
            Redirect::to(LOGIN_START).into_response()
        }
    }
}

async fn complete_google_login(params: GoogleCallbackQuery, state: &AppState) -> Result<Html<String>, AppError> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Google OAuth not configured".to_string()))?;

    if let Some(error) = params.error {
        return Err(OAuthError::Denied(error).into());
    }
    let code = params.code.ok_or(OAuthError::MissingParam("code"))?;
    let raw_state = params.state.ok_or(OAuthError::MissingParam("state"))?;
    let login_state = decode_state(&raw_state, Utc::now().timestamp())?;

    let token_response = google.exchange_code(&code).await?;
    let user_info = google.user_info(&token_response.access_token).await?;
    if !user_info.verified_email {
        return Err(OAuthError::UnverifiedEmail(user_info.email).into());
    }

    let identity = Identity::from_google(&user_info.email, user_info.name, user_info.picture)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let profile = Profile {
        email: user_info.email.trim().to_string(),
        name: identity.name.clone(),
        picture: identity.picture.clone(),
        last_login: Utc::now(),
    };
    let sessions = SessionStore::new(state.stores.for_user(&identity.key));
    if let Err(e) = sessions.save_profile(&identity.key, &profile).await {
        tracing::warn!(user = %identity.key, "could not save profile: {}", e);
    }

    let token = issue_token(&identity, &state.jwt_secret, Duration::days(USER_SESSION_DAYS))?;
    tracing::info!(user = %identity.key, "👤 User logged in via Google");

    Ok(Html(login_page(&token, &identity, &login_state.redirect_to)))
}

/// Stores the session token in the browser and continues to `redirect_to`.
fn login_page(token: &str, identity: &Identity, redirect_to: &str) -> String {
    let js = |value: String| value.replace('<', "\\u003c");
    format!(
        r#"<!DOCTYPE html><html><head><title>Login Successful</title>
        <style>body {{ font-family: Arial; max-width: 600px; margin: 100px auto; text-align: center; }}</style>
        </head><body>
        <h1>✅ Successfully logged in with Google</h1>
        <p>Redirecting...</p>
        <script>
            localStorage.setItem('authToken', {});
            localStorage.setItem('user', {});
            setTimeout(() => window.location.href = {}, 500);
        </script>
        </body></html>"#,
        js(json!(token).to_string()),
        js(json!(json!(identity).to_string()).to_string()),
        js(json!(redirect_to).to_string()),
    )
}

async fn guest_login(Extension(state): Extension<Arc<AppState>>) -> Result<Json<SessionResponse>, AppError> {
    let identity = Identity::guest();
    let store = state.stores.for_user(&identity.key);
    // Fresh key, but start from an empty tree regardless.
    ConversationStore::new(store.clone()).delete_all(&identity.key).await?;

    let ttl = Duration::hours(GUEST_SESSION_HOURS);
    SessionStore::new(store)
        .set_session_expiry(&identity.key, (Utc::now() + ttl).timestamp())
        .await?;

    let token = issue_token(&identity, &state.jwt_secret, ttl)?;
    tracing::info!(user = %identity.key, "guest session started");

    Ok(Json(SessionResponse {
        success: true,
        token,
        user: identity,
        guest: true,
    }))
}

async fn me(Extension(identity): Extension<Identity>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "guest": identity.is_guest(),
        "user": identity,
    }))
}

/// Tokens are stateless; only guest data needs clearing.
async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, AppError> {
    if identity.is_guest() {
        ConversationStore::new(state.stores.for_user(&identity.key))
            .delete_all(&identity.key)
            .await?;
    }
    tracing::info!(user = %identity.key, "logged out");
    Ok(Json(json!({ "success": true })))
}
