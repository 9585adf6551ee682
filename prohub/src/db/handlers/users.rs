//! Database repository for users.

use crate::types::{UserId, abbrev_uuid};
use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}

fn push_user_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", search.to_lowercase());
        query.push(" AND (LOWER(email) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(COALESCE(display_name, '')) LIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
    if let Some(role) = filter.role {
        query.push(" AND role = ");
        query.push_bind(role);
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(role = %request.role), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, email, display_name, avatar_url, role, auth_source, password_hash, external_user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.email.trim().to_lowercase())
        .bind(&request.display_name)
        .bind(&request.avatar_url)
        .bind(request.role)
        .bind(&request.auth_source)
        .bind(&request.password_hash)
        .bind(&request.external_user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<Self::Id, UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM users WHERE 1=1");
        push_user_filters(&mut query, filter);

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let users = query.build_query_as::<UserDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                avatar_url = COALESCE($3, avatar_url),
                phone = COALESCE($4, phone),
                role = COALESCE($5, role),
                password_hash = COALESCE($6, password_hash),
                external_user_id = COALESCE($7, external_user_id),
                payment_provider_id = COALESCE($8, payment_provider_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.display_name)
        .bind(&request.avatar_url)
        .bind(&request.phone)
        .bind(request.role)
        .bind(&request.password_hash)
        .bind(&request.external_user_id)
        .bind(&request.payment_provider_id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count users matching the filter, ignoring pagination
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_user_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Emails are stored lower-cased, so lookups are case-insensitive
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, external_user_id), err)]
    pub async fn get_user_by_external_id(&mut self, external_user_id: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE external_user_id = $1")
            .bind(external_user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, payment_provider_id), err)]
    pub async fn get_user_by_payment_provider_id(&mut self, payment_provider_id: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE payment_provider_id = $1")
            .bind(payment_provider_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn record_login(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    fn new_user(email: &str, role: Role) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            display_name: Some("Test User".to_string()),
            avatar_url: None,
            role,
            auth_source: "native".to_string(),
            password_hash: None,
            external_user_id: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&new_user("Test@Example.com", Role::Customer)).await.unwrap();
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.role, Role::Customer);
        assert_eq!(user.display_name, Some("Test User".to_string()));
        assert!(user.last_login.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&new_user("dup@example.com", Role::Customer)).await.unwrap();
        let err = repo.create(&new_user("DUP@example.com", Role::Professional)).await.unwrap_err();
        assert!(err.is_unique_violation_on("users_email_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_user_by_email_is_case_insensitive(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&new_user("email@example.com", Role::Customer)).await.unwrap();

        let found = repo.get_user_by_email("EMAIL@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(repo.get_user_by_email("missing@example.com").await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_user_keeps_unset_fields(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&new_user("update@example.com", Role::Customer)).await.unwrap();

        let updated = repo
            .update(
                created.id,
                &UserUpdateDBRequest {
                    phone: Some("+33 1 23 45 67 89".to_string()),
                    role: Some(Role::Professional),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Professional);
        assert_eq!(updated.phone.as_deref(), Some("+33 1 23 45 67 89"));
        assert_eq!(updated.display_name, Some("Test User".to_string()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_missing_user_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let err = repo.update(Uuid::new_v4(), &UserUpdateDBRequest::default()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_and_count_with_filters(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&new_user("alice@example.com", Role::Customer)).await.unwrap();
        repo.create(&new_user("bob@example.com", Role::Professional)).await.unwrap();
        repo.create(&new_user("carol@example.com", Role::Professional)).await.unwrap();

        let filter = UserFilter {
            role: Some(Role::Professional),
            ..UserFilter::new(0, 10)
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 2);
        assert_eq!(repo.count(&filter).await.unwrap(), 2);

        let filter = UserFilter {
            search: Some("ALI".to_string()),
            ..UserFilter::new(0, 10)
        };
        let found = repo.list(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "alice@example.com");

        assert_eq!(repo.list(&UserFilter::new(1, 1)).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_external_id_lookup_and_login_record(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let mut request = new_user("oauth@example.com", Role::Customer);
        request.auth_source = "google".to_string();
        request.external_user_id = Some("google-123".to_string());
        let created = repo.create(&request).await.unwrap();

        let found = repo.get_user_by_external_id("google-123").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        repo.record_login(created.id).await.unwrap();
        let reloaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(reloaded.last_login.is_some());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
