//! Google OAuth sign-in.
//!
//! The post-login intent (`role`, `action`, `next`) travels through Google in the
//! `state` parameter as `base64url(json) "." base64url(hmac_sha256(json))`, keyed
//! with the server's `secret_key`. The issue time `t` (unix millis) bounds how
//! long a state stays usable.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    api::models::{auth::OAuthAction, users::Role},
    config::Config,
    errors::Error,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Invalid OAuth state: {0}")]
    InvalidState(&'static str),

    #[error("OAuth state has expired")]
    ExpiredState,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<OAuthError> for Error {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured => Error::ServiceUnavailable { message: err.to_string() },
            OAuthError::InvalidState(_) | OAuthError::ExpiredState => Error::BadRequest { message: err.to_string() },
            OAuthError::Provider(_) | OAuthError::Http(_) => Error::Internal {
                operation: format!("complete Google sign-in: {err}"),
            },
        }
    }
}

/// Intent encoded into the OAuth state parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub role: Role,
    pub action: OAuthAction,
    pub next: String,
    /// Issue time, unix milliseconds
    pub t: i64,
}

impl OAuthState {
    /// Build a fresh state. Admin accounts can never be created through OAuth.
    pub fn new(role: Option<Role>, action: Option<OAuthAction>, next: Option<&str>) -> Self {
        let role = match role {
            Some(Role::Professional) => Role::Professional,
            _ => Role::Customer,
        };
        Self {
            role,
            action: action.unwrap_or_default(),
            next: sanitize_next(next),
            t: Utc::now().timestamp_millis(),
        }
    }
}

/// Only same-site relative paths are accepted as post-login targets
pub fn sanitize_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') && !path.contains("://") => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn sign(payload: &[u8], secret: &str) -> Result<Vec<u8>, OAuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| OAuthError::InvalidState("signing key"))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Serialize and sign a state for the authorization redirect
pub fn encode_state(state: &OAuthState, secret: &str) -> Result<String, OAuthError> {
    let json = serde_json::to_vec(state).map_err(|_| OAuthError::InvalidState("unserializable"))?;
    let signature = sign(&json, secret)?;
    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(&json), URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify and decode a state returned by the identity provider
pub fn decode_state(raw: &str, secret: &str, ttl: Duration, now_ms: i64) -> Result<OAuthState, OAuthError> {
    let (payload, signature) = raw.split_once('.').ok_or(OAuthError::InvalidState("malformed"))?;
    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| OAuthError::InvalidState("malformed payload"))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| OAuthError::InvalidState("malformed signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| OAuthError::InvalidState("signing key"))?;
    mac.update(&json);
    mac.verify_slice(&signature).map_err(|_| OAuthError::InvalidState("bad signature"))?;

    let mut state: OAuthState = serde_json::from_slice(&json).map_err(|_| OAuthError::InvalidState("malformed payload"))?;

    let age_ms = now_ms.saturating_sub(state.t);
    if age_ms < 0 || age_ms > ttl.as_millis() as i64 {
        return Err(OAuthError::ExpiredState);
    }
    state.next = sanitize_next(Some(&state.next));
    Ok(state)
}

/// Profile returned by Google's OpenID userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    /// Stable Google account ID
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: String,
    redirect_url: Url,
    auth_url: Url,
    token_url: Url,
    userinfo_url: Url,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn from_config(config: &Config) -> Result<Self, OAuthError> {
        let google = &config.auth.google;
        if !google.enabled {
            return Err(OAuthError::NotConfigured);
        }
        let (Some(client_id), Some(client_secret)) = (&google.client_id, &google.client_secret) else {
            return Err(OAuthError::NotConfigured);
        };
        let redirect_url = google
            .redirect_url(&config.public_url)
            .map_err(|e| OAuthError::Provider(format!("invalid redirect URL: {e}")))?;

        Ok(Self {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_url,
            auth_url: google.auth_url.clone(),
            token_url: google.token_url.clone(),
            userinfo_url: google.userinfo_url.clone(),
            http: crate::http_client(),
        })
    }

    /// URL of Google's consent screen carrying the signed state
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("prompt", "select_account")
            .append_pair("state", state);
        url
    }

    /// Exchange an authorization code for an access token
    #[instrument(skip_all, err)]
    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", code)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("redirect_uri", self.redirect_url.as_str())
            .append_pair("grant_type", "authorization_code")
            .finish();

        let response = self
            .http
            .post(self.token_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            debug!(%status, %detail, "Token exchange rejected");
            return Err(OAuthError::Provider(format!("token exchange returned {status}")));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    #[instrument(skip_all, err)]
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Provider(format!("userinfo returned {}", response.status())));
        }

        let info: GoogleUserInfo = response.json().await?;
        if !info.email_verified {
            return Err(OAuthError::Provider("Google account email is not verified".to_string()));
        }
        Ok(info)
    }
}
