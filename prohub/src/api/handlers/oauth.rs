use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use crate::{
    AppState,
    api::models::{
        auth::{CookieRedirect, OAuthAction, OAuthCallbackQuery, OAuthStartQuery, OAuthStartResponse, TokenHandoffQuery},
        professionals::ProfessionalCreate,
        users::{CurrentUser, Role, UserResponse},
    },
    auth::{
        current_user::session_cookie_token,
        oauth::{self, GoogleOAuthClient, GoogleUserInfo, OAuthError, OAuthState},
        session,
    },
    config::Config,
    db::{
        handlers::{Professionals, Repository, Users},
        models::{
            professionals::ProfessionalCreateDBRequest,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    errors::Error,
};

fn state_secret(config: &Config) -> Result<&str, Error> {
    config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "OAuth state: secret_key is required".to_string(),
    })
}

/// A frontend URL for `path`, falling back to the frontend root
fn frontend_path(config: &Config, path: &str) -> String {
    config
        .frontend_url
        .join(path)
        .unwrap_or_else(|_| config.frontend_url.clone())
        .to_string()
}

fn sign_in_error(config: &Config, reason: &str) -> CookieRedirect {
    let mut url = config
        .frontend_url
        .join("/sign-in")
        .unwrap_or_else(|_| config.frontend_url.clone());
    url.query_pairs_mut().append_pair("error", reason);
    CookieRedirect {
        location: url.to_string(),
        cookie: None,
    }
}

fn authorization_url(state: &AppState, query: OAuthStartQuery) -> Result<Url, Error> {
    let client = GoogleOAuthClient::from_config(&state.config)?;
    let oauth_state = OAuthState::new(query.role, query.action, query.next.as_deref());
    let encoded = oauth::encode_state(&oauth_state, state_secret(&state.config)?)?;
    Ok(client.authorization_url(&encoded))
}

/// Start Google sign-in
#[utoipa::path(
    get,
    path = "/auth/google",
    tag = "authentication",
    summary = "Start Google sign-in",
    description = "Redirects to Google's consent screen. `role`, `action` and `next` come back to the callback.",
    params(OAuthStartQuery),
    responses(
        (status = 302, description = "Redirect to Google"),
        (status = 503, description = "Google sign-in is not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn google_redirect(State(state): State<AppState>, Query(query): Query<OAuthStartQuery>) -> Result<Response, Error> {
    let url = authorization_url(&state, query)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response())
}

/// Get the Google sign-in URL
#[utoipa::path(
    post,
    path = "/auth/google",
    tag = "authentication",
    summary = "Google sign-in URL",
    description = "Same as the GET form, for clients that navigate themselves.",
    request_body = OAuthStartQuery,
    responses(
        (status = 200, description = "Authorization URL", body = OAuthStartResponse),
        (status = 503, description = "Google sign-in is not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn google_authorization_url(
    State(state): State<AppState>,
    Json(request): Json<OAuthStartQuery>,
) -> Result<Json<OAuthStartResponse>, Error> {
    let url = authorization_url(&state, request)?;
    Ok(Json(OAuthStartResponse { url: url.to_string() }))
}

enum SignIn {
    User(UserDBResponse),
    Unregistered,
}

/// Resolve the Google profile to an account, creating one on registration
async fn resolve_user(state: &AppState, oauth_state: &OAuthState, info: GoogleUserInfo) -> Result<SignIn, Error> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    let existing = match users.get_user_by_external_id(&info.sub).await? {
        Some(user) => Some(user),
        None => users.get_user_by_email(&info.email).await?,
    };

    let user = match existing {
        Some(user) if user.external_user_id.is_none() => {
            // First Google sign-in for an account registered by email
            let update = UserUpdateDBRequest {
                external_user_id: Some(info.sub.clone()),
                avatar_url: user.avatar_url.is_none().then(|| info.picture.clone()).flatten(),
                ..Default::default()
            };
            users.update(user.id, &update).await?
        }
        Some(user) => user,
        None if oauth_state.action == OAuthAction::Register => {
            let user = users
                .create(&UserCreateDBRequest {
                    email: info.email,
                    display_name: info.name,
                    avatar_url: info.picture,
                    role: oauth_state.role,
                    auth_source: "google".to_string(),
                    password_hash: None,
                    external_user_id: Some(info.sub),
                })
                .await?;
            if user.role == Role::Professional {
                Professionals::new(&mut tx)
                    .create(&ProfessionalCreateDBRequest::new(user.id, ProfessionalCreate::default()))
                    .await?;
            }
            info!(user_id = %user.id, role = %user.role, "Registered user through Google");
            user
        }
        None => return Ok(SignIn::Unregistered),
    };

    Users::new(&mut tx).record_login(user.id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(SignIn::User(user))
}

async fn complete_google_sign_in(state: &AppState, query: OAuthCallbackQuery) -> Result<CookieRedirect, Error> {
    let config = &state.config;
    if let Some(error) = query.error {
        warn!(%error, "Google sign-in was not completed");
        return Ok(sign_in_error(config, &error));
    }
    let (Some(code), Some(raw_state)) = (query.code, query.state) else {
        return Ok(sign_in_error(config, "invalid_request"));
    };

    let oauth_state = match oauth::decode_state(
        &raw_state,
        state_secret(config)?,
        config.auth.google.state_ttl,
        Utc::now().timestamp_millis(),
    ) {
        Ok(oauth_state) => oauth_state,
        Err(e) => {
            warn!("Rejected OAuth state: {}", e);
            let reason = if matches!(e, OAuthError::ExpiredState) { "expired_state" } else { "invalid_state" };
            return Ok(sign_in_error(config, reason));
        }
    };

    let client = GoogleOAuthClient::from_config(config)?;
    let profile = match client.exchange_code(&code).await {
        Ok(access_token) => client.fetch_user_info(&access_token).await,
        Err(e) => Err(e),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Google sign-in failed: {}", e);
            return Ok(sign_in_error(config, "provider_error"));
        }
    };

    let user = match resolve_user(state, &oauth_state, profile).await? {
        SignIn::User(user) => user,
        SignIn::Unregistered => {
            return Ok(CookieRedirect {
                location: frontend_path(config, "/unregistered"),
                cookie: None,
            });
        }
    };

    let current_user = CurrentUser::from(UserResponse::from(user));
    let token = session::create_session_token(&current_user, config)?;

    let mut location = config
        .frontend_url
        .join("/auth/callback")
        .unwrap_or_else(|_| config.frontend_url.clone());
    location
        .query_pairs_mut()
        .append_pair("token", &token)
        .append_pair("next", &oauth_state.next);

    Ok(CookieRedirect {
        location: location.to_string(),
        cookie: Some(session::session_cookie(&token, config)),
    })
}

/// Google OAuth callback
#[utoipa::path(
    get,
    path = "/auth/google/callback",
    tag = "authentication",
    summary = "Google callback",
    description = "Completes Google sign-in and hands the session to the frontend. \
        Failures redirect to the frontend sign-in page with an `error` parameter.",
    params(OAuthCallbackQuery),
    responses(
        (status = 303, description = "Redirect to the frontend"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn google_callback(State(state): State<AppState>, Query(query): Query<OAuthCallbackQuery>) -> Result<CookieRedirect, Error> {
    match complete_google_sign_in(&state, query).await {
        Ok(redirect) => Ok(redirect),
        Err(Error::ServiceUnavailable { message }) => Err(Error::ServiceUnavailable { message }),
        Err(e) => {
            tracing::error!("Google sign-in failed: {}", e);
            Ok(sign_in_error(&state.config, "server_error"))
        }
    }
}

/// Session handoff landing
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = "authentication",
    summary = "Session handoff",
    description = "Sets the session cookie from a token and redirects to `next`. \
        Without a usable token or session this redirects to the sign-in page.",
    params(TokenHandoffQuery),
    responses(
        (status = 303, description = "Redirect to the frontend"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn token_handoff(State(state): State<AppState>, parts: Parts) -> CookieRedirect {
    let config = &state.config;
    let query = Query::<TokenHandoffQuery>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    let next = frontend_path(config, &oauth::sanitize_next(query.next.as_deref()));

    if let Some(token) = query.token.as_deref()
        && session::verify_session_token(token, config).is_ok()
    {
        return CookieRedirect {
            location: next,
            cookie: Some(session::session_cookie(token, config)),
        };
    }

    let has_session = session_cookie_token(&parts, &config.auth.native.session.cookie_name)
        .is_some_and(|token| session::verify_session_token(token, config).is_ok());
    if has_session {
        return CookieRedirect { location: next, cookie: None };
    }

    CookieRedirect {
        location: frontend_path(config, "/sign-in"),
        cookie: None,
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            auth::{OAuthAction, OAuthStartResponse},
            users::Role,
        },
        auth::oauth::{OAuthState, encode_state},
        config::Config,
        db::handlers::{Professionals, Users},
        test_utils::{create_test_app, create_test_app_with_config, create_test_config, create_test_user, session_token},
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn google_config(server: &MockServer) -> Config {
        let mut config = create_test_config();
        config.auth.google.enabled = true;
        config.auth.google.client_id = Some("client-123".to_string());
        config.auth.google.client_secret = Some("shh".to_string());
        config.auth.google.auth_url = Url::parse(&format!("{}/auth", server.uri())).unwrap();
        config.auth.google.token_url = Url::parse(&format!("{}/token", server.uri())).unwrap();
        config.auth.google.userinfo_url = Url::parse(&format!("{}/userinfo", server.uri())).unwrap();
        config
    }

    async fn mock_google(server: &MockServer, sub: &str, email: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": sub,
                "email": email,
                "email_verified": true,
                "name": "Google Person",
            })))
            .mount(server)
            .await;
    }

    fn state_for(config: &Config, role: Role, action: OAuthAction) -> String {
        let state = OAuthState::new(Some(role), Some(action), Some("/dashboard"));
        encode_state(&state, config.secret_key.as_deref().unwrap()).unwrap()
    }

    fn location(response: &axum_test::TestResponse) -> String {
        response.headers()["location"].to_str().unwrap().to_string()
    }

    #[sqlx::test]
    async fn test_google_disabled_is_unavailable(pool: PgPool) {
        let server = create_test_app(pool).await;
        server.get("/auth/google").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[sqlx::test]
    async fn test_google_start_redirects_with_signed_state(pool: PgPool) {
        let google = MockServer::start().await;
        let server = create_test_app_with_config(pool, google_config(&google)).await;

        let response = server.get("/auth/google?role=professional&action=register&next=/onboarding").await;
        response.assert_status(StatusCode::FOUND);
        let url = Url::parse(&location(&response)).unwrap();
        assert!(url.as_str().starts_with(&google.uri()));
        let state = url.query_pairs().find(|(k, _)| k == "state").unwrap().1.to_string();
        assert_eq!(state.split('.').count(), 2);

        let body: OAuthStartResponse = server
            .post("/auth/google")
            .json(&json!({ "role": "customer" }))
            .await
            .json();
        assert!(body.url.contains("client_id=client-123"));
    }

    #[sqlx::test]
    async fn test_google_register_creates_professional(pool: PgPool) {
        let google = MockServer::start().await;
        mock_google(&google, "g-1", "newpro@example.com").await;
        let config = google_config(&google);
        let state = state_for(&config, Role::Professional, OAuthAction::Register);
        let server = create_test_app_with_config(pool.clone(), config).await;

        let response = server
            .get("/auth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", state)
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let target = location(&response);
        assert!(target.starts_with("http://localhost:3000/auth/callback?token="), "{target}");
        assert!(target.contains("next=%2Fdashboard"));
        assert!(response.headers()["set-cookie"].to_str().unwrap().starts_with("access_token="));

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_user_by_external_id("g-1").await.unwrap().unwrap();
        assert_eq!(user.role, Role::Professional);
        assert_eq!(user.auth_source, "google");
        assert!(Professionals::new(&mut conn).get_by_user_id(user.id).await.unwrap().is_some());
    }

    #[sqlx::test]
    async fn test_google_login_unknown_user_goes_to_unregistered(pool: PgPool) {
        let google = MockServer::start().await;
        mock_google(&google, "g-2", "stranger@example.com").await;
        let config = google_config(&google);
        let state = state_for(&config, Role::Customer, OAuthAction::Login);
        let server = create_test_app_with_config(pool, config).await;

        let response = server
            .get("/auth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", state)
            .await;
        assert_eq!(location(&response), "http://localhost:3000/unregistered");
    }

    #[sqlx::test]
    async fn test_google_login_links_existing_email_account(pool: PgPool) {
        let existing = create_test_user(&pool, Role::Customer).await;
        let google = MockServer::start().await;
        mock_google(&google, "g-3", &existing.email).await;
        let config = google_config(&google);
        let state = state_for(&config, Role::Professional, OAuthAction::Login);
        let server = create_test_app_with_config(pool.clone(), config).await;

        let response = server
            .get("/auth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", state)
            .await;
        assert!(location(&response).contains("/auth/callback?token="));

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_user_by_external_id("g-3").await.unwrap().unwrap();
        assert_eq!(user.id, existing.id);
        // The state's role never changes an existing account
        assert_eq!(user.role, Role::Customer);
    }

    #[sqlx::test]
    async fn test_google_callback_failures_redirect_to_sign_in(pool: PgPool) {
        let google = MockServer::start().await;
        let server = create_test_app_with_config(pool, google_config(&google)).await;

        let denied = server.get("/auth/google/callback?error=access_denied").await;
        assert_eq!(location(&denied), "http://localhost:3000/sign-in?error=access_denied");

        let forged = server.get("/auth/google/callback?code=abc&state=bm90.c2lnbmVk").await;
        assert_eq!(location(&forged), "http://localhost:3000/sign-in?error=invalid_state");
    }

    #[sqlx::test]
    async fn test_token_handoff(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let token = session_token(&user);

        let response = server
            .get("/auth/callback")
            .add_query_param("token", &token)
            .add_query_param("next", "/reservations")
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "http://localhost:3000/reservations");
        assert!(response.headers()["set-cookie"].to_str().unwrap().contains(&token));

        // Session cookie instead of a token
        let response = server
            .get("/auth/callback?next=/profile")
            .add_header("cookie", format!("access_token={token}"))
            .await;
        assert_eq!(location(&response), "http://localhost:3000/profile");

        // Nothing usable: sign in, never an error
        let response = server.get("/auth/callback?token=bogus&next=https://evil.example.com").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "http://localhost:3000/sign-in");
    }
}
