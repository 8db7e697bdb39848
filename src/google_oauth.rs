use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const LOGIN_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

/// How long a consent round trip may take before its state is rejected.
const STATE_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Google returned an error: {0}")]
    Denied(String),
    #[error("missing {0} in callback")]
    MissingParam(&'static str),
    #[error("invalid state parameter")]
    InvalidState,
    #[error("state parameter expired")]
    ExpiredState,
    #[error("Google account email {0} is not verified")]
    UnverifiedEmail(String),
    #[error("request to Google failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{stage} failed with {status}: {body}")]
    Status { stage: &'static str, status: u16, body: String },
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub verified_email: bool,
}

/// Round-tripped through Google in the `state` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthState {
    pub redirect_to: String,
    pub timestamp: i64,
}

pub fn encode_state(redirect_to: &str, now: i64) -> String {
    let state = json!({
        "redirect_to": redirect_to,
        "timestamp": now,
    });
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(state.to_string())
}

pub fn decode_state(raw: &str, now: i64) -> Result<OAuthState, OAuthError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| OAuthError::InvalidState)?;
    let state: OAuthState = serde_json::from_slice(&bytes).map_err(|_| OAuthError::InvalidState)?;
    // Only same-site paths; anything else would turn login into an open redirect.
    if !state.redirect_to.starts_with('/') || state.redirect_to.starts_with("//") {
        return Err(OAuthError::InvalidState);
    }
    if now - state.timestamp > STATE_MAX_AGE_SECS || state.timestamp > now + 60 {
        return Err(OAuthError::ExpiredState);
    }
    Ok(state)
}

/// Google sign-in: consent URL, code exchange and profile lookup.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client: Client,
    config: GoogleOAuthConfig,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self::with_endpoints(config, TOKEN_URL, USERINFO_URL)
    }

    pub fn with_endpoints(config: GoogleOAuthConfig, token_url: &str, userinfo_url: &str) -> Self {
        Self {
            client: Client::new(),
            config,
            token_url: token_url.to_string(),
            userinfo_url: userinfo_url.to_string(),
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        let scope_string = LOGIN_SCOPES.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope_string),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for access token
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokenResponse, OAuthError> {
        let params = json!({
            "code": code,
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "redirect_uri": self.config.redirect_uri,
            "grant_type": "authorization_code"
        });

        let response = self.client.post(&self.token_url).json(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Status { stage: "token exchange", status, body });
        }
        Ok(response.json().await?)
    }

    pub async fn user_info(&self, access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Status { stage: "profile lookup", status, body });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::Value;

    fn config() -> GoogleOAuthConfig {
        GoogleOAuthConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            redirect_uri: "http://localhost:8080/api/auth/google/callback".into(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_authorize_url_carries_client_and_scopes() {
        let oauth = GoogleOAuth::new(config());
        let url = oauth.authorize_url("abc");
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("userinfo.email"));
        assert!(url.contains("state=abc"));
        assert!(!url.contains("shh"));
    }

    #[test]
    fn test_state_round_trip_and_rejections() {
        let raw = encode_state("/chat", 1_000);
        let state = decode_state(&raw, 1_100).unwrap();
        assert_eq!(state.redirect_to, "/chat");

        assert!(matches!(decode_state(&raw, 1_000 + STATE_MAX_AGE_SECS + 1), Err(OAuthError::ExpiredState)));
        assert!(matches!(decode_state("not base64!", 1_000), Err(OAuthError::InvalidState)));
        let offsite = encode_state("https://evil.example", 1_000);
        assert!(matches!(decode_state(&offsite, 1_000), Err(OAuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_exchange_and_profile() {
        let app = Router::new()
            .route(
                "/token",
                post(|Json(body): Json<Value>| async move {
                    if body["code"] == "good" && body["grant_type"] == "authorization_code" {
                        (StatusCode::OK, Json(json!({"access_token": "at-1", "expires_in": 3599, "token_type": "Bearer"})))
                    } else {
                        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
                    }
                }),
            )
            .route(
                "/userinfo",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers["authorization"], "Bearer at-1");
                    Json(json!({"id": "1", "email": "Ana@Example.com", "name": "Ana", "verified_email": true}))
                }),
            );
        let base = serve(app).await;
        let oauth = GoogleOAuth::with_endpoints(config(), &format!("{}/token", base), &format!("{}/userinfo", base));

        let token = oauth.exchange_code("good").await.unwrap();
        assert_eq!(token.access_token, "at-1");
        let info = oauth.user_info(&token.access_token).await.unwrap();
        assert_eq!(info.email, "Ana@Example.com");
        assert_eq!(info.picture, None);

        let err = oauth.exchange_code("bad").await.unwrap_err();
        assert!(matches!(err, OAuthError::Status { status: 400, .. }));
    }
}
