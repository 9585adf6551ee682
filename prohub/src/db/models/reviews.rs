//! Database models for reviews.

use crate::api::models::reviews::ReviewStatus;
use crate::types::{ProfessionalId, ReservationId, ReviewId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ReviewCreateDBRequest {
    pub professional_id: ProfessionalId,
    pub user_id: UserId,
    pub reservation_id: Option<ReservationId>,
    pub rating: i16,
    pub comment: Option<String>,
    pub status: ReviewStatus,
}

#[derive(Debug, Clone)]
pub struct ReviewUpdateDBRequest {
    pub status: ReviewStatus,
}

/// A review joined with its author's display name
#[derive(Debug, Clone, FromRow)]
pub struct ReviewDBResponse {
    pub id: ReviewId,
    pub professional_id: ProfessionalId,
    pub user_id: UserId,
    pub reservation_id: Option<ReservationId>,
    pub rating: i16,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub skip: i64,
    pub limit: i64,
    pub professional_id: Option<ProfessionalId>,
    pub status: Option<ReviewStatus>,
}
