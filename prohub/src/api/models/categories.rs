//! API request/response models for service categories.

use super::pagination::Pagination;
use crate::db::models::categories::CategoryDBResponse;
use crate::types::CategoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCreate {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryDBResponse> for CategoryResponse {
    fn from(db: CategoryDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListCategoriesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring match on the name
    pub search: Option<String>,
}
