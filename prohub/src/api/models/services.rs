//! API request/response models for services offered by professionals.

use super::pagination::Pagination;
use crate::db::models::services::ServiceDBResponse;
use crate::types::{CategoryId, ProfessionalId, ServiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreate {
    /// Owning professional. Defaults to the caller's own profile; only admins may set another.
    #[schema(value_type = Option<String>, format = "uuid")]
    pub professional_id: Option<ProfessionalId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_minutes: i32,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ServiceId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    #[schema(value_type = Option<String>, format = "uuid")]
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

impl From<ServiceDBResponse> for ServiceResponse {
    fn from(db: ServiceDBResponse) -> Self {
        Self {
            id: db.id,
            professional_id: db.professional_id,
            category_id: db.category_id,
            category_name: db.category_name,
            name: db.name,
            description: db.description,
            price: db.price,
            duration_minutes: db.duration_minutes,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Validate the numeric constraints shared by create and update
pub fn validate_service_fields(name: Option<&str>, price: Option<Decimal>, duration_minutes: Option<i32>) -> Vec<String> {
    let mut errors = Vec::new();
    if name.is_some_and(|n| n.trim().is_empty()) {
        errors.push("name must not be empty".to_string());
    }
    if price.is_some_and(|p| p < Decimal::ZERO) {
        errors.push("price must be greater than or equal to 0".to_string());
    }
    if duration_minutes.is_some_and(|d| d <= 0) {
        errors.push("durationMinutes must be greater than 0".to_string());
    }
    errors
}

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListServicesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub professional_id: Option<ProfessionalId>,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,

    /// Include inactive services (default: false)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub include_inactive: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_service_fields() {
        assert!(validate_service_fields(Some("Haircut"), Some(Decimal::ZERO), Some(30)).is_empty());

        let errors = validate_service_fields(Some("  "), Some(Decimal::from_str("-1.00").unwrap()), Some(0));
        assert_eq!(errors.len(), 3);
    }
}
