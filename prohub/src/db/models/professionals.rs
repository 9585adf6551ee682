//! Database models for professional profiles.

use crate::api::models::professionals::{ProfessionalCreate, ProfessionalUpdate};
use crate::geo::BoundingBox;
use crate::types::{CategoryId, ProfessionalId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

pub const DEFAULT_SERVICE_RADIUS_KM: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ProfessionalCreateDBRequest {
    pub user_id: UserId,
    pub speciality: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: f64,
}

impl ProfessionalCreateDBRequest {
    pub fn new(user_id: UserId, create: ProfessionalCreate) -> Self {
        Self {
            user_id,
            speciality: create.speciality,
            bio: create.bio,
            location: create.location,
            latitude: create.latitude,
            longitude: create.longitude,
            service_radius_km: create.service_radius_km.unwrap_or(DEFAULT_SERVICE_RADIUS_KM),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfessionalUpdateDBRequest {
    pub speciality: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub profile_image_url: Option<String>,
}

impl From<ProfessionalUpdate> for ProfessionalUpdateDBRequest {
    fn from(update: ProfessionalUpdate) -> Self {
        Self {
            speciality: update.speciality,
            bio: update.bio,
            location: update.location,
            latitude: update.latitude,
            longitude: update.longitude,
            service_radius_km: update.service_radius_km,
            profile_image_url: None,
        }
    }
}

/// A professional profile joined with the owning user's public fields
#[derive(Debug, Clone, FromRow)]
pub struct ProfessionalDBResponse {
    pub id: ProfessionalId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub speciality: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: f64,
    pub profile_image_url: Option<String>,
    pub rating_average: f64,
    pub rating_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for listing professionals
#[derive(Debug, Clone, Default)]
pub struct ProfessionalFilter {
    pub skip: i64,
    pub limit: i64,
    /// Free text over display name, speciality, bio and location
    pub search: Option<String>,
    pub speciality: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_rating: Option<f64>,
    /// Only profiles with coordinates
    pub geolocated_only: bool,
    /// Only profiles with coordinates inside this box
    pub within: Option<BoundingBox>,
}

impl ProfessionalFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}
