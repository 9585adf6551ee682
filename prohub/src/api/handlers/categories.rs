use crate::api::models::categories::{CategoryCreate, CategoryResponse, CategoryUpdate, ListCategoriesQuery};
use crate::api::models::pagination::PaginatedResponse;
use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::db::handlers::{Categories, Repository};
use crate::db::models::categories::{CategoryCreateDBRequest, CategoryFilter, CategoryUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::CategoryId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn not_found(id: CategoryId) -> Error {
    Error::NotFound {
        resource: "Category".to_string(),
        id: id.to_string(),
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Category name must not be empty".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/categories",
    tag = "categories",
    summary = "List categories",
    params(ListCategoriesQuery),
    responses(
        (status = 200, description = "Paginated list of categories", body = PaginatedResponse<CategoryResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<ListCategoriesQuery>,
) -> Result<Json<PaginatedResponse<CategoryResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = CategoryFilter {
        skip,
        limit,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(&mut conn);
    let categories = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        categories.into_iter().map(CategoryResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Get category",
    params(("id" = uuid::Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category", body = CategoryResponse),
        (status = 404, description = "Category not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_category(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<Json<CategoryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut conn).get_by_id(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(category.into()))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "categories",
    summary = "Create category",
    request_body = CategoryCreate,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Invalid category"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Name already taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_category(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Categories, operation::CreateAll>,
    Json(create): Json<CategoryCreate>,
) -> Result<(StatusCode, Json<CategoryResponse>)> {
    require_name(&create.name)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut conn)
        .create(&CategoryCreateDBRequest {
            name: create.name,
            description: create.description,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(category.into())))
}

#[utoipa::path(
    put,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Update category",
    request_body = CategoryUpdate,
    params(("id" = uuid::Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Name already taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    _: RequiresPermission<resource::Categories, operation::UpdateAll>,
    Json(update): Json<CategoryUpdate>,
) -> Result<Json<CategoryResponse>> {
    if let Some(ref name) = update.name {
        require_name(name)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut conn)
        .update(
            id,
            &CategoryUpdateDBRequest {
                name: update.name,
                description: update.description,
            },
        )
        .await?;

    Ok(Json(category.into()))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Delete category",
    description = "Services in the category are kept and become uncategorised.",
    params(("id" = uuid::Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    _: RequiresPermission<resource::Categories, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Categories::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_category, create_test_user};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_categories_are_public_to_read(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let cleaning = create_test_category(&pool, "Cleaning").await;
        create_test_category(&pool, "Gardening").await;

        let page: PaginatedResponse<CategoryResponse> = app.get("/categories").await.json();
        assert_eq!(page.total_count, 2);

        let page: PaginatedResponse<CategoryResponse> = app.get("/categories?search=clean").await.json();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, cleaning.id);

        let category: CategoryResponse = app.get(&format!("/categories/{}", cleaning.id)).await.json();
        assert_eq!(category.name, "Cleaning");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_category_writes_are_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let professional = create_test_user(&pool, Role::Professional).await;
        let admin = create_test_admin_user(&pool).await;

        let headers = add_auth_headers(&professional);
        app.post("/categories")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Moving" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let headers = add_auth_headers(&admin);
        let response = app
            .post("/categories")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Moving", "description": "Vans and hands" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: CategoryResponse = response.json();

        app.post("/categories")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Moving" }))
            .await
            .assert_status(StatusCode::CONFLICT);
        app.post("/categories")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "  " }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let updated: CategoryResponse = app
            .put(&format!("/categories/{}", created.id))
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "description": "Removals" }))
            .await
            .json();
        assert_eq!(updated.name, "Moving");
        assert_eq!(updated.description.as_deref(), Some("Removals"));

        app.delete(&format!("/categories/{}", created.id))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/categories/{}", created.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
