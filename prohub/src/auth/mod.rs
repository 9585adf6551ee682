//! Authentication and authorization.
//!
//! # Authentication
//!
//! Sessions are stateless HS256 JWTs signed with `secret_key`. A request is
//! authenticated by, in order:
//!
//! 1. `Authorization: Bearer <token>`, as sent by API clients
//! 2. The session cookie (`access_token` by default), as set by the login,
//!    registration and OAuth callback routes for browsers
//!
//! Accounts are created either natively (email + password, Argon2id hashed) or
//! through Google OAuth. See [`oauth`] for how post-login intent is carried
//! through the identity provider.
//!
//! # Authorization
//!
//! Each role maps to a fixed set of grants; see [`permissions`].
//!
//! ```ignore
//! use prohub::auth::permissions::{RequiresPermission, operation, resource};
//!
//! async fn create_service(
//!     current_user: RequiresPermission<resource::Services, operation::CreateOwn>,
//! ) -> Result<String, Error> {
//!     Ok(format!("Hello, {}!", current_user.email))
//! }
//! ```
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated caller
//! - [`oauth`]: Google OAuth client and signed state codec
//! - [`password`]: Argon2 hashing and the password strength policy
//! - [`permissions`]: Role grants, ownership checks and the `RequiresPermission` extractor
//! - [`session`]: JWT creation and verification, session cookies

pub mod current_user;
pub mod oauth;
pub mod password;
pub mod permissions;
pub mod session;
