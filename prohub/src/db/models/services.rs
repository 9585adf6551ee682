//! Database models for services offered by professionals.

use crate::types::{CategoryId, ProfessionalId, ServiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ServiceCreateDBRequest {
    pub professional_id: ProfessionalId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_minutes: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceUpdateDBRequest {
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

/// A service joined with its category name
#[derive(Debug, Clone, FromRow)]
pub struct ServiceDBResponse {
    pub id: ServiceId,
    pub professional_id: ProfessionalId,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub skip: i64,
    pub limit: i64,
    pub professional_id: Option<ProfessionalId>,
    pub category_id: Option<CategoryId>,
    pub include_inactive: bool,
}
