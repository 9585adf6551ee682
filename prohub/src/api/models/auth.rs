use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::models::{
    professionals::{ProfessionalCreate, ProfessionalResponse},
    users::{Role, UserResponse},
};

/// Request to register a new user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Email address (must be unique)
    pub email: String,
    /// Password (will be hashed)
    pub password: String,
    pub display_name: Option<String>,
    /// `customer` (default) or `professional`
    pub role: Option<Role>,
    /// Initial profile when registering as a professional
    pub professional: Option<ProfessionalCreate>,
}

/// Request to login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response after successful login or registration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// Session token, also set as the session cookie
    pub token: String,
    pub message: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// The caller's account, with the professional profile when there is one
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub professional: Option<ProfessionalResponse>,
}

fn with_cookie(status: StatusCode, cookie: &str, body: impl Serialize) -> Response {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.insert(header::SET_COOKIE, value);
        }
        Err(e) => {
            tracing::error!("Refusing to send malformed session cookie: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (status, headers, Json(body)).into_response()
}

/// Structured response for successful registration
pub struct RegisterResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::CREATED, &self.cookie, self.auth_response)
    }
}

/// Structured response for successful login
pub struct LoginResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::OK, &self.cookie, self.auth_response)
    }
}

/// Structured response for successful logout
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::OK, &self.cookie, self.auth_response)
    }
}

/// A redirect that also sets (or clears) the session cookie
pub struct CookieRedirect {
    pub location: String,
    pub cookie: Option<String>,
}

impl IntoResponse for CookieRedirect {
    fn into_response(self) -> Response {
        let mut response = Redirect::to(&self.location).into_response();
        if let Some(cookie) = self.cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!("Dropping malformed session cookie on redirect: {}", e),
            }
        }
        response
    }
}

/// Request to initiate password reset
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    /// Email address to send reset link to
    pub email: String,
}

/// Request to confirm password reset with token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirmRequest {
    /// Reset token from email
    pub token: String,
    pub new_password: String,
}

/// Response for password reset operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetResponse {
    pub message: String,
}

/// Request to change password (for authenticated users)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Current password (for verification)
    pub current_password: String,
    pub new_password: String,
}

/// Whether the OAuth round trip signs an existing user in or creates one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OAuthAction {
    #[default]
    Login,
    Register,
}

/// Post-login intent carried through the identity provider
#[derive(Debug, Default, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct OAuthStartQuery {
    /// Role for new accounts (`customer` or `professional`)
    pub role: Option<Role>,
    pub action: Option<OAuthAction>,
    /// Relative path to land on after sign-in
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthStartResponse {
    /// Identity provider authorization URL
    pub url: String,
}

/// Parameters the identity provider sends back
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Frontend landing parameters after an OAuth handoff
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TokenHandoffQuery {
    pub token: Option<String>,
    pub next: Option<String>,
}
