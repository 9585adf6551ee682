//! Database repository for service categories.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::categories::{CategoryCreateDBRequest, CategoryDBResponse, CategoryFilter, CategoryUpdateDBRequest},
    },
    types::{CategoryId, abbrev_uuid},
};

fn push_category_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &CategoryFilter) {
    if let Some(ref search) = filter.search {
        query.push(" AND LOWER(name) LIKE ");
        query.push_bind(format!("%{}%", search.to_lowercase()));
    }
}

pub struct Categories<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Categories<'c> {
    type CreateRequest = CategoryCreateDBRequest;
    type UpdateRequest = CategoryUpdateDBRequest;
    type Response = CategoryDBResponse;
    type Id = CategoryId;
    type Filter = CategoryFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let category = sqlx::query_as::<_, CategoryDBResponse>(
            "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(category)
    }

    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let category = sqlx::query_as::<_, CategoryDBResponse>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(category)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let categories = sqlx::query_as::<_, CategoryDBResponse>("SELECT * FROM categories WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(categories.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM categories WHERE 1=1");
        push_category_filters(&mut query, filter);

        query.push(" ORDER BY name ASC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let categories = query.build_query_as::<CategoryDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(categories)
    }

    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let category = sqlx::query_as::<_, CategoryDBResponse>(
            r#"
            UPDATE categories SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(&request.description)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(category)
    }
}

impl<'c> Categories<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &CategoryFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM categories WHERE 1=1");
        push_category_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn category(name: &str) -> CategoryCreateDBRequest {
        CategoryCreateDBRequest {
            name: name.to_string(),
            description: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_bulk_skips_unknown_ids(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        let plumbing = repo.create(&category("Plumbing")).await.unwrap();
        let painting = repo.create(&category("Painting")).await.unwrap();
        let unknown = Uuid::new_v4();

        let found = repo.get_bulk(vec![plumbing.id, painting.id, unknown]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&painting.id].name, "Painting");
        assert!(!found.contains_key(&unknown));
        assert!(repo.get_bulk(vec![]).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_category_crud(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        let created = repo.create(&category("  Plumbing ")).await.unwrap();
        assert_eq!(created.name, "Plumbing");

        let updated = repo
            .update(
                created.id,
                &CategoryUpdateDBRequest {
                    description: Some("Pipes and taps".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Plumbing");
        assert_eq!(updated.description.as_deref(), Some("Pipes and taps"));

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unique_name_and_search(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        repo.create(&category("Cleaning")).await.unwrap();
        repo.create(&category("Gardening")).await.unwrap();

        let err = repo.create(&category("Cleaning")).await.unwrap_err();
        assert!(err.is_unique_violation_on("categories_name_unique"));

        let filter = CategoryFilter {
            skip: 0,
            limit: 10,
            search: Some("GARD".to_string()),
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        assert_eq!(repo.list(&filter).await.unwrap()[0].name, "Gardening");
    }
}
