use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    db::handlers::{Repository, Users},
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use sqlx::PgPool;
use tracing::{debug, instrument, trace};

/// Extract user from an `Authorization: Bearer <jwt>` header if present
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(user)): Valid token found and verified
/// - Some(Err(error)): Bearer token present but invalid or expired
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?.trim();
    Some(session::verify_session_token(token, config))
}

/// Find the raw session token in the request cookies
pub fn session_cookie_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Extract user from the JWT session cookie if present
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid token found and verified
/// - Some(Err(error)): Cookie present but the token is invalid or expired
#[instrument(skip(parts, config))]
fn try_cookie_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let token = session_cookie_token(parts, &config.auth.native.session.cookie_name)?;
    Some(session::verify_session_token(token, config))
}

/// Authenticate a request from its headers alone.
///
/// The bearer header wins over the cookie; a bad bearer token still lets a valid
/// cookie through, so a stale `Authorization` header doesn't lock a browser session out.
pub fn authenticate(parts: &Parts, config: &Config) -> Result<CurrentUser> {
    let mut auth_errors = Vec::new();

    match try_bearer_auth(parts, config) {
        Some(Ok(user)) => {
            debug!("Found bearer authenticated user: {}", user.id);
            return Ok(user);
        }
        Some(Err(e)) => {
            trace!("Bearer authentication failed: {:?}", e);
            auth_errors.push(("Bearer token", e));
        }
        None => trace!("No bearer authentication attempted"),
    }

    match try_cookie_auth(parts, config) {
        Some(Ok(user)) => {
            debug!("Found cookie authenticated user: {}", user.id);
            return Ok(user);
        }
        Some(Err(e)) => {
            trace!("Cookie authentication failed: {:?}", e);
            auth_errors.push(("Session cookie", e));
        }
        None => trace!("No cookie authentication attempted"),
    }

    // Internal failures (e.g. a missing signing key) must not masquerade as a 401
    if let Some(position) = auth_errors.iter().position(|(_, e)| matches!(e, Error::Internal { .. })) {
        return Err(auth_errors.swap_remove(position).1);
    }

    if auth_errors.is_empty() {
        trace!("No authentication credentials found in request");
        Err(Error::Unauthenticated { message: None })
    } else {
        trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
        Err(Error::Unauthenticated {
            message: Some("Invalid or expired session".to_string()),
        })
    }
}

/// Reload the account behind a verified session. Role changes and deletions take
/// effect on the next request instead of when the token expires.
#[instrument(skip(user, db), fields(user_id = %user.id))]
pub async fn refresh_from_db(user: CurrentUser, db: &PgPool) -> Result<CurrentUser> {
    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    match Users::new(&mut conn).get_by_id(user.id).await? {
        Some(account) => {
            if account.role != user.role {
                debug!(from = %user.role, to = %account.role, "Session role is stale, using stored role");
            }
            Ok(account.into())
        }
        None => Err(Error::Unauthenticated {
            message: Some("Account no longer exists".to_string()),
        }),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = authenticate(parts, &state.config)?;
        refresh_from_db(user, &state.db).await
    }
}

/// `Option<CurrentUser>` resolves to `None` for anonymous callers and callers
/// with unusable credentials, for routes that behave differently when signed in.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        let verified = match authenticate(parts, &state.config) {
            Ok(user) => refresh_from_db(user, &state.db).await,
            Err(e) => Err(e),
        };
        match verified {
            Ok(user) => Ok(Some(user)),
            Err(Error::Unauthenticated { .. } | Error::BadRequest { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
