//! Database models for uploaded professional images.

use crate::types::{ImageId, ProfessionalId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ImageCreateDBRequest {
    pub professional_id: ProfessionalId,
    pub url: String,
    pub storage_key: String,
    pub description: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageDBResponse {
    pub id: ImageId,
    pub professional_id: ProfessionalId,
    pub url: String,
    pub storage_key: String,
    pub description: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
