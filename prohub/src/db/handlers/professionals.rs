//! Database repository for professional profiles.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::professionals::{
            ProfessionalCreateDBRequest, ProfessionalDBResponse, ProfessionalFilter, ProfessionalUpdateDBRequest,
        },
    },
    types::{ProfessionalId, UserId, abbrev_uuid},
};

/// Profile columns joined with the owner's public fields. Expects `p` and `u` aliases.
const PROFESSIONAL_SELECT: &str = r#"
    SELECT p.id, p.user_id, u.display_name, u.avatar_url, p.speciality, p.bio, p.location,
           p.latitude, p.longitude, p.service_radius_km, p.profile_image_url,
           p.rating_average, p.rating_count, p.created_at, p.updated_at
    FROM professionals p
    JOIN users u ON u.id = p.user_id
"#;

fn push_professional_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ProfessionalFilter) {
    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", search.trim().to_lowercase());
        query.push(" AND (LOWER(COALESCE(u.display_name, '')) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(COALESCE(p.speciality, '')) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(COALESCE(p.bio, '')) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(COALESCE(p.location, '')) LIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
    if let Some(ref speciality) = filter.speciality {
        query.push(" AND LOWER(p.speciality) = ");
        query.push_bind(speciality.trim().to_lowercase());
    }
    if let Some(category_id) = filter.category_id {
        query.push(" AND EXISTS (SELECT 1 FROM services s WHERE s.professional_id = p.id AND s.is_active AND s.category_id = ");
        query.push_bind(category_id);
        query.push(")");
    }
    if let Some(min_rating) = filter.min_rating {
        query.push(" AND p.rating_average >= ");
        query.push_bind(min_rating);
    }
    if filter.geolocated_only || filter.within.is_some() {
        query.push(" AND p.latitude IS NOT NULL AND p.longitude IS NOT NULL");
    }
    if let Some(bbox) = filter.within {
        query.push(" AND p.latitude BETWEEN ");
        query.push_bind(bbox.min_lat);
        query.push(" AND ");
        query.push_bind(bbox.max_lat);
        query.push(" AND p.longitude BETWEEN ");
        query.push_bind(bbox.min_lng);
        query.push(" AND ");
        query.push_bind(bbox.max_lng);
    }
}

pub struct Professionals<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Professionals<'c> {
    type CreateRequest = ProfessionalCreateDBRequest;
    type UpdateRequest = ProfessionalUpdateDBRequest;
    type Response = ProfessionalDBResponse;
    type Id = ProfessionalId;
    type Filter = ProfessionalFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO professionals (id, user_id, speciality, bio, location, latitude, longitude, service_radius_km)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(request.user_id)
        .bind(&request.speciality)
        .bind(&request.bio)
        .bind(&request.location)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(request.service_radius_km)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let professional = sqlx::query_as::<_, ProfessionalDBResponse>(&format!("{PROFESSIONAL_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(professional)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let professionals =
            sqlx::query_as::<_, ProfessionalDBResponse>(&format!("{PROFESSIONAL_SELECT} WHERE p.id = ANY($1)"))
                .bind(&ids)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(professionals.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{PROFESSIONAL_SELECT} WHERE 1=1"));
        push_professional_filters(&mut query, filter);

        query.push(" ORDER BY p.rating_average DESC, p.rating_count DESC, p.created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let professionals = query.build_query_as::<ProfessionalDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(professionals)
    }

    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM professionals WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE professionals SET
                speciality = COALESCE($2, speciality),
                bio = COALESCE($3, bio),
                location = COALESCE($4, location),
                latitude = COALESCE($5, latitude),
                longitude = COALESCE($6, longitude),
                service_radius_km = COALESCE($7, service_radius_km),
                profile_image_url = COALESCE($8, profile_image_url),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&request.speciality)
        .bind(&request.bio)
        .bind(&request.location)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(request.service_radius_km)
        .bind(&request.profile_image_url)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Professionals<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ProfessionalFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM professionals p JOIN users u ON u.id = p.user_id WHERE 1=1");
        push_professional_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Every profile matching the filter, ignoring pagination. Used for radius search,
    /// where the exact distance filter runs after the query.
    #[instrument(skip(self, filter), err)]
    pub async fn list_unpaginated(&mut self, filter: &ProfessionalFilter) -> Result<Vec<ProfessionalDBResponse>> {
        let mut query = QueryBuilder::new(format!("{PROFESSIONAL_SELECT} WHERE 1=1"));
        push_professional_filters(&mut query, filter);
        query.push(" ORDER BY p.rating_average DESC, p.created_at DESC");

        let professionals = query.build_query_as::<ProfessionalDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(professionals)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId) -> Result<Option<ProfessionalDBResponse>> {
        let professional =
            sqlx::query_as::<_, ProfessionalDBResponse>(&format!("{PROFESSIONAL_SELECT} WHERE p.user_id = $1"))
                .bind(user_id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(professional)
    }

    /// Lock the profile row until the transaction ends. Bookings and availability
    /// writes for the same professional take this lock before their overlap checks,
    /// so concurrent writers see each other's rows. Returns false if the profile is gone.
    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: ProfessionalId) -> Result<bool> {
        let row: Option<(ProfessionalId,)> = sqlx::query_as("SELECT id FROM professionals WHERE id = $1 FOR NO KEY UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.is_some())
    }

    /// Recompute the rating aggregates from approved reviews
    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&id)), err)]
    pub async fn recompute_rating(&mut self, id: ProfessionalId) -> Result<(f64, i32)> {
        let row: Option<(f64, i32)> = sqlx::query_as(
            r#"
            UPDATE professionals SET
                rating_average = COALESCE((
                    SELECT ROUND(AVG(rating)::numeric, 2)::float8
                    FROM reviews WHERE professional_id = $1 AND status = 'approved'
                ), 0),
                rating_count = (
                    SELECT COUNT(*)::int FROM reviews WHERE professional_id = $1 AND status = 'approved'
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING rating_average, rating_count
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        row.ok_or(DbError::NotFound)
    }
}
