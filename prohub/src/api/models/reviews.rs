//! API request/response models for reviews.

use super::pagination::Pagination;
use crate::db::models::reviews::ReviewDBResponse;
use crate::types::{ProfessionalId, ReservationId, ReviewId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "review_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCreate {
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    /// The completed reservation being reviewed
    #[schema(value_type = String, format = "uuid")]
    pub reservation_id: ReservationId,
    /// 1 to 5
    pub rating: i16,
    pub comment: Option<String>,
}

impl ReviewCreate {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err(format!("rating must be between 1 and 5, got {}", self.rating));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewStatusUpdate {
    pub status: ReviewStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReviewId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub reservation_id: Option<ReservationId>,
    pub rating: i16,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReviewDBResponse> for ReviewResponse {
    fn from(db: ReviewDBResponse) -> Self {
        Self {
            id: db.id,
            professional_id: db.professional_id,
            user_id: db.user_id,
            reservation_id: db.reservation_id,
            rating: db.rating,
            comment: db.comment,
            status: db.status,
            author_name: db.author_name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListReviewsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub professional_id: Option<ProfessionalId>,

    /// Non-admins only ever see approved reviews
    pub status: Option<ReviewStatus>,
}
