//! Database models for users.

use crate::api::models::users::{Role, UserUpdate};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
    /// `native`, `google` or `system`
    pub auth_source: String,
    pub password_hash: Option<String>,
    pub external_user_id: Option<String>,
}

/// Database request for updating a user
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
    pub external_user_id: Option<String>,
    pub payment_provider_id: Option<String>,
}

impl UserUpdateDBRequest {
    pub fn new(update: UserUpdate) -> Self {
        Self {
            display_name: update.display_name,
            avatar_url: update.avatar_url,
            phone: update.phone,
            role: update.role,
            ..Default::default()
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub auth_source: String,
    pub external_user_id: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub payment_provider_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
