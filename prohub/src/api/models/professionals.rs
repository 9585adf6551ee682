//! API request/response models for professional profiles.

use super::pagination::Pagination;
use super::services::ServiceResponse;
use crate::db::models::professionals::ProfessionalDBResponse;
use crate::types::{CategoryId, ProfessionalId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalCreate {
    pub speciality: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Distance in kilometres the professional is willing to travel (default 10)
    pub service_radius_km: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalUpdate {
    pub speciality: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProfessionalId,
    #[schema(value_type = String, format = "uuid")]
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
    /// Great-circle distance from the search origin, only present on radius searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    /// Offered services, only present on single-profile lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(no_recursion)]
    pub services: Option<Vec<ServiceResponse>>,
}

impl From<ProfessionalDBResponse> for ProfessionalResponse {
    fn from(db: ProfessionalDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            display_name: db.display_name,
            avatar_url: db.avatar_url,
            speciality: db.speciality,
            bio: db.bio,
            location: db.location,
            latitude: db.latitude,
            longitude: db.longitude,
            service_radius_km: db.service_radius_km,
            profile_image_url: db.profile_image_url,
            rating_average: db.rating_average,
            rating_count: db.rating_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
            distance_km: None,
            services: None,
        }
    }
}

impl ProfessionalResponse {
    pub fn with_services(mut self, services: Vec<ServiceResponse>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_distance(mut self, distance_km: f64) -> Self {
        self.distance_km = Some((distance_km * 100.0).round() / 100.0);
        self
    }
}

/// Query parameters for searching professionals
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListProfessionalsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Free-text search over name, speciality, bio and location
    pub q: Option<String>,

    /// Case-insensitive speciality match
    pub speciality: Option<String>,

    /// Only professionals offering an active service in this category
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,

    /// Minimum average rating
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub min_rating: Option<f64>,

    /// Latitude of the search origin
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub lat: Option<f64>,

    /// Longitude of the search origin
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub lng: Option<f64>,

    /// Search radius in km. When omitted each professional's own service radius applies.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub radius_km: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_parses_numbers_from_query_string() {
        let query: ListProfessionalsQuery =
            serde_urlencoded::from_str("q=plumb&lat=48.85&lng=2.35&radiusKm=5&minRating=4&limit=20").unwrap();
        assert_eq!(query.q.as_deref(), Some("plumb"));
        assert_eq!(query.lat, Some(48.85));
        assert_eq!(query.lng, Some(2.35));
        assert_eq!(query.radius_km, Some(5.0));
        assert_eq!(query.min_rating, Some(4.0));
        assert_eq!(query.pagination.limit(), 20);
    }
}
