//! Database models for availability slots.

use crate::types::{AvailabilityId, ProfessionalId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct AvailabilityCreateDBRequest {
    pub professional_id: ProfessionalId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Default)]
pub struct AvailabilityUpdateDBRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AvailabilityDBResponse {
    pub id: AvailabilityId,
    pub professional_id: ProfessionalId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AvailabilityFilter {
    pub professional_id: ProfessionalId,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
