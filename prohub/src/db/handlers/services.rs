//! Database repository for services offered by professionals.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::services::{ServiceCreateDBRequest, ServiceDBResponse, ServiceFilter, ServiceUpdateDBRequest},
    },
    types::{ProfessionalId, ServiceId, abbrev_uuid},
};

const SERVICE_SELECT: &str = r#"
    SELECT s.id, s.professional_id, s.category_id, c.name AS category_name, s.name, s.description,
           s.price, s.duration_minutes, s.is_active, s.created_at, s.updated_at
    FROM services s
    LEFT JOIN categories c ON c.id = s.category_id
"#;

fn push_service_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ServiceFilter) {
    if let Some(professional_id) = filter.professional_id {
        query.push(" AND s.professional_id = ");
        query.push_bind(professional_id);
    }
    if let Some(category_id) = filter.category_id {
        query.push(" AND s.category_id = ");
        query.push_bind(category_id);
    }
    if !filter.include_inactive {
        query.push(" AND s.is_active");
    }
}

pub struct Services<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Services<'c> {
    type CreateRequest = ServiceCreateDBRequest;
    type UpdateRequest = ServiceUpdateDBRequest;
    type Response = ServiceDBResponse;
    type Id = ServiceId;
    type Filter = ServiceFilter;

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO services (id, professional_id, category_id, name, description, price, duration_minutes, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(request.professional_id)
        .bind(request.category_id)
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(request.price)
        .bind(request.duration_minutes)
        .bind(request.is_active)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let service = sqlx::query_as::<_, ServiceDBResponse>(&format!("{SERVICE_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(service)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let services = sqlx::query_as::<_, ServiceDBResponse>(&format!("{SERVICE_SELECT} WHERE s.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(services.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{SERVICE_SELECT} WHERE 1=1"));
        push_service_filters(&mut query, filter);

        query.push(" ORDER BY s.name ASC, s.created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let services = query.build_query_as::<ServiceDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(services)
    }

    #[instrument(skip(self), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE services SET
                category_id = COALESCE($2, category_id),
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                duration_minutes = COALESCE($6, duration_minutes),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(request.category_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(&request.description)
        .bind(request.price)
        .bind(request.duration_minutes)
        .bind(request.is_active)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Services<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ServiceFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM services s WHERE 1=1");
        push_service_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// All services of one professional, for profile pages
    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id)), err)]
    pub async fn list_for_professional(
        &mut self,
        professional_id: ProfessionalId,
        include_inactive: bool,
    ) -> Result<Vec<ServiceDBResponse>> {
        let mut query = QueryBuilder::new(format!("{SERVICE_SELECT} WHERE 1=1"));
        push_service_filters(
            &mut query,
            &ServiceFilter {
                professional_id: Some(professional_id),
                include_inactive,
                ..Default::default()
            },
        );
        query.push(" ORDER BY s.name ASC");

        let services = query.build_query_as::<ServiceDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(services)
    }
}
