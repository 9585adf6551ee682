//! Database repository for reviews.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::reviews::{ReviewCreateDBRequest, ReviewDBResponse, ReviewFilter, ReviewUpdateDBRequest},
    },
    types::{ReviewId, abbrev_uuid},
};

const REVIEW_SELECT: &str = r#"
    SELECT rv.id, rv.professional_id, rv.user_id, rv.reservation_id, rv.rating, rv.comment, rv.status,
           u.display_name AS author_name, rv.created_at, rv.updated_at
    FROM reviews rv
    JOIN users u ON u.id = rv.user_id
"#;

fn push_review_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ReviewFilter) {
    if let Some(professional_id) = filter.professional_id {
        query.push(" AND rv.professional_id = ");
        query.push_bind(professional_id);
    }
    if let Some(status) = filter.status {
        query.push(" AND rv.status = ");
        query.push_bind(status);
    }
}

pub struct Reviews<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Reviews<'c> {
    type CreateRequest = ReviewCreateDBRequest;
    type UpdateRequest = ReviewUpdateDBRequest;
    type Response = ReviewDBResponse;
    type Id = ReviewId;
    type Filter = ReviewFilter;

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id), rating = request.rating), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO reviews (id, professional_id, user_id, reservation_id, rating, comment, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(request.professional_id)
        .bind(request.user_id)
        .bind(request.reservation_id)
        .bind(request.rating)
        .bind(&request.comment)
        .bind(request.status)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let review = sqlx::query_as::<_, ReviewDBResponse>(&format!("{REVIEW_SELECT} WHERE rv.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(review)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let reviews = sqlx::query_as::<_, ReviewDBResponse>(&format!("{REVIEW_SELECT} WHERE rv.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(reviews.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{REVIEW_SELECT} WHERE 1=1"));
        push_review_filters(&mut query, filter);

        query.push(" ORDER BY rv.created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let reviews = query.build_query_as::<ReviewDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(reviews)
    }

    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(review_id = %abbrev_uuid(&id), status = ?request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query("UPDATE reviews SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(request.status)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Reviews<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ReviewFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM reviews rv WHERE 1=1");
        push_review_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }
}
