use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::{CurrentUser, ListUsersQuery, UserResponse, UserUpdate};
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::db::handlers::{Repository, Users, users::UserFilter};
use crate::db::models::users::UserUpdateDBRequest;
use crate::errors::{Error, Result};
use crate::types::{Operation, Permission, Resource, UserId, UserIdOrCurrent};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn resolve_user_id(id: UserIdOrCurrent, current_user: &CurrentUser) -> UserId {
    match id {
        UserIdOrCurrent::Current(_) => current_user.id,
        UserIdOrCurrent::Id(id) => id,
    }
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "Admin only. Supports substring search over email and display name.",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter {
        skip,
        limit,
        search: query.search.filter(|s| !s.trim().is_empty()),
        role: query.role,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    description = "Get a user by ID, or `current` for the caller.",
    params(("user_id" = String, Path, description = "User ID (UUID) or 'current'")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let user_id = resolve_user_id(user_id, &current_user);
    permissions::require_owner(&current_user, user_id, Resource::Users, Operation::ReadOwn)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: user_id.to_string(),
    })?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    put,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user",
    description = "Users may edit their own profile. Only admins may change roles.",
    request_body = UserUpdate,
    params(("user_id" = String, Path, description = "User ID (UUID) or 'current'")),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let user_id = resolve_user_id(user_id, &current_user);
    permissions::require_owner(&current_user, user_id, Resource::Users, Operation::UpdateOwn)?;

    if update.role.is_some() && !current_user.is_admin() {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Users, Operation::UpdateAll),
            action: Operation::UpdateAll,
            resource: "user role".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .update(user_id, &UserUpdateDBRequest::new(update))
        .await?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete user",
    description = "Deletes the account and everything it owns.",
    params(("user_id" = String, Path, description = "User ID (UUID) or 'current'")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let user_id = resolve_user_id(user_id, &current_user);
    permissions::require_owner(&current_user, user_id, Resource::Users, Operation::DeleteOwn)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).delete(user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::users::{Role, UserResponse};
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_user, get_user};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_users_is_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let customer = create_test_user(&pool, Role::Customer).await;
        let admin = create_test_admin_user(&pool).await;
        create_test_user(&pool, Role::Professional).await;

        let headers = add_auth_headers(&customer);
        app.get("/users")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let headers = add_auth_headers(&admin);
        let response = app.get("/users?role=professional").add_header(&headers[0].0, &headers[0].1).await;
        response.assert_status_ok();
        let page: PaginatedResponse<UserResponse> = response.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].role, Role::Professional);

        let page: PaginatedResponse<UserResponse> = app
            .get("/users?limit=2")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .json();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.limit, 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_current_and_other_users(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let other = create_test_user(&pool, Role::Customer).await;
        let headers = add_auth_headers(&user);

        let me: UserResponse = app
            .get("/users/current")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .json();
        assert_eq!(me.id, user.id);

        app.get(&format!("/users/{}", other.id))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let admin = create_test_admin_user(&pool).await;
        let headers = add_auth_headers(&admin);
        app.get(&format!("/users/{}", other.id))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status_ok();
        app.get(&format!("/users/{}", uuid::Uuid::new_v4()))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_user_role_changes_are_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let headers = add_auth_headers(&user);

        let updated: UserResponse = app
            .put("/users/current")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "displayName": "Renamed", "phone": "+34 600 000 000" }))
            .await
            .json();
        assert_eq!(updated.display_name.as_deref(), Some("Renamed"));
        assert_eq!(updated.phone.as_deref(), Some("+34 600 000 000"));

        app.put(&format!("/users/{}", user.id))
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "role": "admin" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let admin = create_test_admin_user(&pool).await;
        let admin_headers = add_auth_headers(&admin);
        app.put(&format!("/users/{}", user.id))
            .add_header(&admin_headers[0].0, &admin_headers[0].1)
            .json(&json!({ "role": "Professional" }))
            .await
            .assert_status_ok();
        assert_eq!(get_user(&pool, user.id).await.role, Role::Professional);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_user(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let other = create_test_user(&pool, Role::Customer).await;
        let headers = add_auth_headers(&user);

        app.delete(&format!("/users/{}", other.id))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.delete("/users/current")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // The session outlives the account but no longer authenticates
        app.get("/users/current")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_demotion_applies_to_existing_sessions(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let demoted = create_test_admin_user(&pool).await;
        let stale_headers = add_auth_headers(&demoted);

        app.get("/users")
            .add_header(&stale_headers[0].0, &stale_headers[0].1)
            .await
            .assert_status_ok();

        let headers = add_auth_headers(&admin);
        app.put(&format!("/users/{}", demoted.id))
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "role": "customer" }))
            .await
            .assert_status_ok();

        // Same token, issued while the account was still an admin
        app.get("/users")
            .add_header(&stale_headers[0].0, &stale_headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        let me: UserResponse = app
            .get("/users/current")
            .add_header(&stale_headers[0].0, &stale_headers[0].1)
            .await
            .json();
        assert_eq!(me.role, Role::Customer);
    }
}
