//! Database models for reservations.

use crate::api::models::reservations::ReservationStatus;
use crate::types::{ProfessionalId, ReservationId, ServiceId, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ReservationCreateDBRequest {
    pub user_id: UserId,
    pub professional_id: ProfessionalId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationUpdateDBRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub status: Option<ReservationStatus>,
    pub notes: Option<String>,
}

/// A reservation joined with service, professional and customer names
#[derive(Debug, Clone, FromRow)]
pub struct ReservationDBResponse {
    pub id: ReservationId,
    pub user_id: UserId,
    pub professional_id: ProfessionalId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub service_name: Option<String>,
    pub professional_name: Option<String>,
    pub customer_name: Option<String>,
    /// Owning user of the professional profile
    pub professional_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
    pub professional_id: Option<ProfessionalId>,
    /// Reservations where the user is either the customer or the provider
    pub participant: Option<UserId>,
    pub status: Option<ReservationStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
