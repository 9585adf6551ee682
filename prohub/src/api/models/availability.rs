//! API request/response models for availability slots.

use super::clock;
use crate::db::models::availability::AvailabilityDBResponse;
use crate::types::{AvailabilityId, ProfessionalId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCreate {
    pub date: NaiveDate,
    /// `HH:mm` or `HH:mm:ss`
    #[serde(with = "clock::hh_mm")]
    #[schema(value_type = String, example = "09:00")]
    pub start_time: NaiveTime,
    #[serde(with = "clock::hh_mm")]
    #[schema(value_type = String, example = "12:00")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
    pub date: Option<NaiveDate>,
    #[serde(default, with = "clock::option_hh_mm")]
    #[schema(value_type = Option<String>, example = "09:00")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock::option_hh_mm")]
    #[schema(value_type = Option<String>, example = "12:00")]
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AvailabilityId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    pub date: NaiveDate,
    #[serde(with = "clock::hh_mm")]
    #[schema(value_type = String, example = "09:00")]
    pub start_time: NaiveTime,
    #[serde(with = "clock::hh_mm")]
    #[schema(value_type = String, example = "12:00")]
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AvailabilityDBResponse> for AvailabilityResponse {
    fn from(db: AvailabilityDBResponse) -> Self {
        Self {
            id: db.id,
            professional_id: db.professional_id,
            date: db.date,
            start_time: db.start_time,
            end_time: db.end_time,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Date window for listing slots
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct AvailabilityQuery {
    /// First date (inclusive)
    pub from: Option<NaiveDate>,
    /// Last date (inclusive)
    pub to: Option<NaiveDate>,
}

/// Ensure a slot is non-empty once both ends are truncated to the minute
pub fn validate_slot(start: NaiveTime, end: NaiveTime) -> Result<(), String> {
    if end <= start {
        return Err(format!(
            "endTime ({}) must be after startTime ({})",
            clock::format_clock_time(&end),
            clock::format_clock_time(&start)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_create_accepts_seconds_precision() {
        let slot: AvailabilityCreate =
            serde_json::from_str(r#"{"date":"2026-05-04","startTime":"09:00:00","endTime":"10:30"}"#).unwrap();
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(slot.end_time, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
    }

    #[test]
    fn test_response_renders_hh_mm() {
        let now = Utc::now();
        let response = AvailabilityResponse::from(AvailabilityDBResponse {
            id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 15, 42).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            created_at: now,
            updated_at: now,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["startTime"], "09:15");
        assert_eq!(json["endTime"], "11:00");
    }

    #[test]
    fn test_validate_slot() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(validate_slot(nine, ten).is_ok());
        assert!(validate_slot(ten, nine).is_err());
        assert!(validate_slot(nine, nine).is_err());
    }
}
