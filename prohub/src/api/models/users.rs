//! API request/response models for users.

use super::pagination::Pagination;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::{fmt, str::FromStr};
use utoipa::{IntoParams, ToSchema};

/// Marketplace role of a user account.
///
/// Parsing is case-insensitive ("Professional", "PROFESSIONAL" and "professional" are the same
/// role); the canonical form is lower case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[schema(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Professional,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Professional => "professional",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "client" => Ok(Role::Customer),
            "professional" => Ok(Role::Professional),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    /// Only admins may change roles
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub auth_source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Whether a billing customer exists for this user. The provider's customer ID is never exposed.
    pub has_payment_provider_id: bool,
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring match on display name or email
    pub search: Option<String>,

    pub role: Option<Role>,
}

/// The authenticated caller, as extracted from a session token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_professional(&self) -> bool {
        self.role == Role::Professional
    }
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            avatar_url: db.avatar_url,
            phone: db.phone,
            role: db.role,
            auth_source: db.auth_source,
            created_at: db.created_at,
            updated_at: db.updated_at,
            last_login: db.last_login,
            has_payment_provider_id: db.payment_provider_id.is_some(),
        }
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            role: db.role,
            display_name: db.display_name,
            avatar_url: db.avatar_url,
        }
    }
}

impl From<UserResponse> for CurrentUser {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Professional".parse::<Role>().unwrap(), Role::Professional);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" customer ".parse::<Role>().unwrap(), Role::Customer);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lower_case() {
        assert_eq!(serde_json::to_string(&Role::Professional).unwrap(), r#""professional""#);
        let role: Role = serde_json::from_str(r#""Customer""#).unwrap();
        assert_eq!(role, Role::Customer);
    }
}
