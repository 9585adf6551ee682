//! API models for uploaded professional images.

use crate::db::models::images::ImageDBResponse;
use crate::types::{ImageId, ProfessionalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ImageId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    pub url: String,
    pub description: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ImageDBResponse> for ImageResponse {
    fn from(db: ImageDBResponse) -> Self {
        Self {
            id: db.id,
            professional_id: db.professional_id,
            url: db.url,
            description: db.description,
            content_type: db.content_type,
            size_bytes: db.size_bytes,
            created_at: db.created_at,
        }
    }
}

/// Result of replacing a professional's profile image
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    pub profile_image_url: String,
}

/// Multipart body shape, for documentation only
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ImageUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub description: Option<String>,
}
