use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginRequest, LoginResponse, LogoutResponse, MeResponse,
            PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse, RegisterRequest, RegisterResponse,
        },
        users::{CurrentUser, Role, UserResponse},
    },
    auth::{password, session},
    db::{
        handlers::{PasswordResetTokens, Professionals, Repository, Users},
        models::{
            professionals::ProfessionalCreateDBRequest,
            users::{UserCreateDBRequest, UserUpdateDBRequest},
        },
    },
    email::EmailService,
    errors::Error,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn require_native_auth(state: &AppState) -> Result<(), Error> {
    if state.config.auth.native.enabled {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        })
    }
}

/// Lower-cased, trimmed email, or a validation error
fn normalize_email(email: &str) -> Result<String, Error> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(char::is_whitespace),
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        })
    }
}

/// Issue a session for the user: the token for the body and the matching cookie
fn issue_session(user: &UserResponse, state: &AppState) -> Result<(String, String), Error> {
    let current_user = CurrentUser::from(user.clone());
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);
    Ok((token, cookie))
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "authentication",
    summary = "Register",
    description = "Create a customer or professional account. Professionals may pass their initial profile. \
        The session token is returned in the body and set as the session cookie.",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input or password too weak"),
        (status = 409, description = "User already exists"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    require_native_auth(&state)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let role = request.role.unwrap_or(Role::Customer);
    if role == Role::Admin {
        return Err(Error::BadRequest {
            message: "Admin accounts cannot be self-registered".to_string(),
        });
    }
    let email = normalize_email(&request.email)?;
    password::validate_password_strength(&request.password, &state.config.auth.native.password)?;

    let password_hash = password::hash_password(request.password, &state.config.auth.native.password).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let mut user_repo = Users::new(&mut tx);
    if user_repo.get_user_by_email(&email).await?.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let display_name = request
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let created_user = user_repo
        .create(&UserCreateDBRequest {
            email,
            display_name,
            avatar_url: None,
            role,
            auth_source: "native".to_string(),
            password_hash: Some(password_hash),
            external_user_id: None,
        })
        .await?;

    if role == Role::Professional {
        let profile = request.professional.unwrap_or_default();
        Professionals::new(&mut tx)
            .create(&ProfessionalCreateDBRequest::new(created_user.id, profile))
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let user_response = UserResponse::from(created_user);
    let (token, cookie) = issue_session(&user_response, &state)?;

    Ok(RegisterResponse {
        auth_response: AuthResponse {
            user: user_response,
            token,
            message: "Registration successful".to_string(),
        },
        cookie,
    })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    summary = "Login",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state)?;
    let invalid_credentials = || Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut conn);

    let mut user = user_repo
        .get_user_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    // OAuth-only accounts have no password to check
    let password_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
    if !password::verify_password(request.password, password_hash).await? {
        return Err(invalid_credentials());
    }

    user_repo.record_login(user.id).await?;
    user.last_login = Some(Utc::now());

    let user_response = UserResponse::from(user);
    let (token, cookie) = issue_session(&user_response, &state)?;

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: user_response,
            token,
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "authentication",
    summary = "Logout",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: session::clear_session_cookie(&state.config),
    })
}

/// Get the current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "authentication",
    summary = "Current user",
    description = "The signed-in account, with its professional profile when there is one.",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not signed in"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<MeResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    // A valid token for a deleted account is no session at all
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or(Error::Unauthenticated { message: None })?;
    let professional = Professionals::new(&mut conn).get_by_user_id(user.id).await?;

    Ok(Json(MeResponse {
        user: user.into(),
        professional: professional.map(Into::into),
    }))
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/auth/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    summary = "Request password reset",
    description = "Always succeeds, so the response does not reveal whether an account exists.",
    responses(
        (status = 200, description = "Password reset email sent", body = PasswordResetResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut tx).get_user_by_email(request.email.trim()).await?;

    // Only native accounts have a password to reset
    if let Some(user) = user.filter(|user| user.password_hash.is_some()) {
        let (raw_token, token) = PasswordResetTokens::new(&mut tx).create_for_user(user.id, &state.config).await?;

        let email_service = EmailService::new(&state.config)?;
        email_service
            .send_password_reset_email(&user.email, user.display_name.as_deref(), &token.id, &raw_token)
            .await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "If an account with that email exists, a password reset link has been sent.".to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/auth/password-resets/{token_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    summary = "Confirm password reset",
    params(("token_id" = uuid::Uuid, Path, description = "Reset token ID from the email link")),
    responses(
        (status = 200, description = "Password reset successful", body = PasswordResetResponse),
        (status = 400, description = "Invalid or expired token, or password too weak"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;
    password::validate_password_strength(&request.new_password, &state.config.auth.native.password)?;

    let new_password_hash = password::hash_password(request.new_password, &state.config.auth.native.password).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let token = PasswordResetTokens::new(&mut tx)
        .find_valid_token_by_id(token_id, &request.token)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Invalid or expired reset token".to_string(),
        })?;

    let update = UserUpdateDBRequest {
        password_hash: Some(new_password_hash),
        ..Default::default()
    };
    Users::new(&mut tx).update(token.user_id, &update).await?;

    // Every outstanding token dies with the old password, this one included
    PasswordResetTokens::new(&mut tx).invalidate_for_user(token.user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}

/// Change password for authenticated user
#[utoipa::path(
    post,
    path = "/auth/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    summary = "Change password",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "Invalid request or password too weak"),
        (status = 401, description = "Current password is incorrect"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state)?;
    password::validate_password_strength(&request.new_password, &state.config.auth.native.password)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);

    let user = user_repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::Unauthenticated {
        message: Some("User not found".to_string()),
    })?;

    let password_hash = user.password_hash.ok_or_else(|| Error::BadRequest {
        message: "Cannot change password for accounts without a password".to_string(),
    })?;

    if !password::verify_password(request.current_password, password_hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let new_password_hash = password::hash_password(request.new_password, &state.config.auth.native.password).await?;
    let update = UserUpdateDBRequest {
        password_hash: Some(new_password_hash),
        ..Default::default()
    };
    user_repo.update(current_user.id, &update).await?;
    PasswordResetTokens::new(&mut tx).invalidate_for_user(current_user.id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}
