//! API request/response models for reservations.

use super::clock;
use super::pagination::Pagination;
use crate::db::models::reservations::ReservationDBResponse;
use crate::types::{ProfessionalId, ReservationId, ServiceId, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
    Rescheduled,
}

/// Who is asking for a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationActor {
    /// The customer who booked
    Customer,
    /// The professional providing the service
    Provider,
    Admin,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::NoShow => "no_show",
            ReservationStatus::Rescheduled => "rescheduled",
        };
        f.write_str(name)
    }
}

impl ReservationStatus {
    /// Statuses that hold the professional's time slot
    pub const ACTIVE: [ReservationStatus; 3] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Rescheduled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Completed | ReservationStatus::NoShow
        )
    }

    /// Check whether `actor` may move a reservation from `self` to `next`.
    /// Returns the reason on rejection.
    pub fn check_transition(self, next: ReservationStatus, actor: ReservationActor) -> Result<(), String> {
        if self == next {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(format!("Reservation is {self} and can no longer change status"));
        }
        match next {
            ReservationStatus::Cancelled | ReservationStatus::Rescheduled => Ok(()),
            ReservationStatus::Pending
            | ReservationStatus::Confirmed
            | ReservationStatus::Completed
            | ReservationStatus::NoShow => match actor {
                ReservationActor::Provider | ReservationActor::Admin => Ok(()),
                ReservationActor::Customer => Err(format!("Only the professional can mark a reservation as {next}")),
            },
        }
    }
}

/// Booking request. Every field is optional at the wire level so that missing
/// fields can be reported together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCreate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub professional_id: Option<ProfessionalId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_id: Option<ServiceId>,
    pub date: Option<NaiveDate>,
    /// Start time, `HH:mm` or `HH:mm:ss`
    #[serde(default, with = "clock::option_hh_mm")]
    #[schema(value_type = Option<String>, example = "14:30")]
    pub time: Option<NaiveTime>,
    pub notes: Option<String>,
}

/// A booking request with all required fields present
#[derive(Debug, Clone)]
pub struct ValidReservationCreate {
    pub user_id: UserId,
    pub professional_id: ProfessionalId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub notes: Option<String>,
}

impl ReservationCreate {
    /// Ensure the required fields are present, naming every missing one
    pub fn validate(self) -> Result<ValidReservationCreate, Vec<String>> {
        let mut missing = Vec::new();
        if self.user_id.is_none() {
            missing.push("userId is required".to_string());
        }
        if self.professional_id.is_none() {
            missing.push("professionalId is required".to_string());
        }
        if self.service_id.is_none() {
            missing.push("serviceId is required".to_string());
        }
        if self.date.is_none() {
            missing.push("date is required".to_string());
        }

        match (self.user_id, self.professional_id, self.service_id, self.date) {
            (Some(user_id), Some(professional_id), Some(service_id), Some(date)) => Ok(ValidReservationCreate {
                user_id,
                professional_id,
                service_id,
                date,
                time: self.time,
                notes: self.notes,
            }),
            _ => Err(missing),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUpdate {
    pub date: Option<NaiveDate>,
    #[serde(default, with = "clock::option_hh_mm")]
    #[schema(value_type = Option<String>, example = "14:30")]
    pub time: Option<NaiveTime>,
    pub status: Option<ReservationStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReservationId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    #[schema(value_type = String, format = "uuid")]
    pub service_id: ServiceId,
    pub date: NaiveDate,
    #[serde(with = "clock::option_hh_mm")]
    #[schema(value_type = Option<String>, example = "14:30")]
    pub time: Option<NaiveTime>,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub service_name: Option<String>,
    pub professional_name: Option<String>,
    pub customer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReservationDBResponse> for ReservationResponse {
    fn from(db: ReservationDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            professional_id: db.professional_id,
            service_id: db.service_id,
            date: db.date,
            time: db.start_time,
            status: db.status,
            notes: db.notes,
            service_name: db.service_name,
            professional_name: db.professional_name,
            customer_name: db.customer_name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListReservationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<ReservationStatus>,

    /// Admin only: filter by customer
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub professional_id: Option<ProfessionalId>,

    /// Earliest reservation date (inclusive)
    pub from: Option<NaiveDate>,

    /// Latest reservation date (inclusive)
    pub to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_validate_reports_every_missing_field() {
        let errors = ReservationCreate::default().validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("userId")));
        assert!(errors.iter().any(|e| e.contains("professionalId")));
        assert!(errors.iter().any(|e| e.contains("serviceId")));
        assert!(errors.iter().any(|e| e.contains("date")));

        let partial = ReservationCreate {
            user_id: Some(Uuid::new_v4()),
            date: NaiveDate::from_ymd_opt(2026, 3, 1),
            ..Default::default()
        };
        assert_eq!(partial.validate().unwrap_err().len(), 2);
    }

    #[test]
    fn test_validate_accepts_complete_request() {
        let request: ReservationCreate = serde_json::from_value(serde_json::json!({
            "userId": Uuid::new_v4(),
            "professionalId": Uuid::new_v4(),
            "serviceId": Uuid::new_v4(),
            "date": "2026-03-01",
            "time": "10:30:00"
        }))
        .unwrap();

        let valid = request.validate().unwrap();
        assert_eq!(valid.time, NaiveTime::from_hms_opt(10, 30, 0));
    }

    #[test]
    fn test_terminal_statuses_cannot_transition() {
        for terminal in [ReservationStatus::Cancelled, ReservationStatus::Completed, ReservationStatus::NoShow] {
            assert!(terminal.is_terminal());
            assert!(
                terminal
                    .check_transition(ReservationStatus::Pending, ReservationActor::Admin)
                    .is_err()
            );
        }
    }

    #[test]
    fn test_customer_transitions_are_limited() {
        let pending = ReservationStatus::Pending;
        assert!(pending.check_transition(ReservationStatus::Cancelled, ReservationActor::Customer).is_ok());
        assert!(pending.check_transition(ReservationStatus::Rescheduled, ReservationActor::Customer).is_ok());
        assert!(pending.check_transition(ReservationStatus::Confirmed, ReservationActor::Customer).is_err());
        assert!(pending.check_transition(ReservationStatus::Completed, ReservationActor::Customer).is_err());

        assert!(pending.check_transition(ReservationStatus::Confirmed, ReservationActor::Provider).is_ok());
        assert!(
            ReservationStatus::Confirmed
                .check_transition(ReservationStatus::NoShow, ReservationActor::Provider)
                .is_ok()
        );
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&ReservationStatus::NoShow).unwrap(), r#""no_show""#);
    }
}
