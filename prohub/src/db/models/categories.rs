//! Database models for service categories.

use crate::types::CategoryId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct CategoryCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryDBResponse {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>,
}
