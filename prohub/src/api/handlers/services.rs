use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::services::{ListServicesQuery, ServiceCreate, ServiceResponse, ServiceUpdate, validate_service_fields};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::db::handlers::{Professionals, Repository, Services};
use crate::db::models::services::{ServiceCreateDBRequest, ServiceDBResponse, ServiceFilter, ServiceUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{Operation, Resource, ServiceId, UserId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

fn check_fields(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation {
            message: "Invalid service".to_string(),
            errors,
        })
    }
}

/// The service together with the user owning its professional profile
async fn load_service(conn: &mut PgConnection, id: ServiceId) -> Result<(ServiceDBResponse, UserId)> {
    let not_found = || Error::NotFound {
        resource: "Service".to_string(),
        id: id.to_string(),
    };
    let service = Services::new(&mut *conn).get_by_id(id).await?.ok_or_else(not_found)?;
    let professional = Professionals::new(conn)
        .get_by_id(service.professional_id)
        .await?
        .ok_or_else(not_found)?;
    Ok((service, professional.user_id))
}

#[utoipa::path(
    get,
    path = "/services",
    tag = "services",
    summary = "List services",
    params(ListServicesQuery),
    responses(
        (status = 200, description = "Paginated list of services", body = PaginatedResponse<ServiceResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<PaginatedResponse<ServiceResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ServiceFilter {
        skip,
        limit,
        professional_id: query.professional_id,
        category_id: query.category_id,
        include_inactive: query.include_inactive.unwrap_or(false),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Services::new(&mut conn);
    let services = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        services.into_iter().map(ServiceResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/services/{id}",
    tag = "services",
    summary = "Get service",
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service", body = ServiceResponse),
        (status = 404, description = "Service not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_service(State(state): State<AppState>, Path(id): Path<ServiceId>) -> Result<Json<ServiceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let service = Services::new(&mut conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Service".to_string(),
        id: id.to_string(),
    })?;
    Ok(Json(service.into()))
}

#[utoipa::path(
    post,
    path = "/services",
    tag = "services",
    summary = "Create service",
    description = "Creates a service on the caller's professional profile. Admins may name another profile.",
    request_body = ServiceCreate,
    responses(
        (status = 201, description = "Service created", body = ServiceResponse),
        (status = 400, description = "Invalid service"),
        (status = 403, description = "Not a professional or not the owner"),
        (status = 404, description = "Professional not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_service(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Services, operation::CreateOwn>,
    Json(create): Json<ServiceCreate>,
) -> Result<(StatusCode, Json<ServiceResponse>)> {
    check_fields(validate_service_fields(
        Some(&create.name),
        Some(create.price),
        Some(create.duration_minutes),
    ))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut professionals = Professionals::new(&mut conn);
    let professional = match create.professional_id {
        Some(id) => professionals.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
            resource: "Professional".to_string(),
            id: id.to_string(),
        })?,
        None => professionals
            .get_by_user_id(current_user.id)
            .await?
            .ok_or_else(|| Error::BadRequest {
                message: "Create a professional profile before adding services".to_string(),
            })?,
    };
    permissions::require_owner(&current_user, professional.user_id, Resource::Services, Operation::CreateOwn)?;

    let service = Services::new(&mut conn)
        .create(&ServiceCreateDBRequest {
            professional_id: professional.id,
            category_id: create.category_id,
            name: create.name.trim().to_string(),
            description: create.description,
            price: create.price,
            duration_minutes: create.duration_minutes,
            is_active: create.is_active.unwrap_or(true),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(service.into())))
}

#[utoipa::path(
    put,
    path = "/services/{id}",
    tag = "services",
    summary = "Update service",
    request_body = ServiceUpdate,
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service updated", body = ServiceResponse),
        (status = 400, description = "Invalid service"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Service not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
    current_user: CurrentUser,
    Json(update): Json<ServiceUpdate>,
) -> Result<Json<ServiceResponse>> {
    check_fields(validate_service_fields(
        update.name.as_deref(),
        update.price,
        update.duration_minutes,
    ))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let (_, owner_id) = load_service(&mut conn, id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Services, Operation::UpdateOwn)?;

    let service = Services::new(&mut conn)
        .update(
            id,
            &ServiceUpdateDBRequest {
                category_id: update.category_id,
                name: update.name.map(|n| n.trim().to_string()),
                description: update.description,
                price: update.price,
                duration_minutes: update.duration_minutes,
                is_active: update.is_active,
            },
        )
        .await?;

    Ok(Json(service.into()))
}

#[utoipa::path(
    delete,
    path = "/services/{id}",
    tag = "services",
    summary = "Delete service",
    description = "Deleting a service also deletes its reservations.",
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 204, description = "Service deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Service not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let (_, owner_id) = load_service(&mut conn, id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Services, Operation::DeleteOwn)?;

    Services::new(&mut conn).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{
        add_auth_headers, create_test_admin_user, create_test_app, create_test_category, create_test_professional,
        create_test_service, create_test_user, get_user,
    };
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;
    use std::str::FromStr;

    #[sqlx::test]
    #[test_log::test]
    async fn test_professional_creates_service_on_own_profile(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let professional = create_test_professional(&pool).await;
        let owner = get_user(&pool, professional.user_id).await;
        let category = create_test_category(&pool, "Plumbing").await;
        let headers = add_auth_headers(&owner);

        let response = app
            .post("/services")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({
                "name": "Boiler service",
                "price": "80.50",
                "durationMinutes": 90,
                "categoryId": category.id,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let service: ServiceResponse = response.json();
        assert_eq!(service.professional_id, professional.id);
        assert_eq!(service.price, Decimal::from_str("80.50").unwrap());
        assert_eq!(service.category_name.as_deref(), Some("Plumbing"));
        assert!(service.is_active);

        let page: PaginatedResponse<ServiceResponse> = app
            .get(&format!("/services?professionalId={}", professional.id))
            .await
            .json();
        assert_eq!(page.total_count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_service_validation_and_roles(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let customer = create_test_user(&pool, Role::Customer).await;
        let headers = add_auth_headers(&customer);
        app.post("/services")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Haircut", "price": 10, "durationMinutes": 30 }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let professional = create_test_professional(&pool).await;
        let owner = get_user(&pool, professional.user_id).await;
        let headers = add_auth_headers(&owner);
        let response = app
            .post("/services")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Haircut", "price": -1, "durationMinutes": 0 }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);

        // Another professional's profile is off limits
        let other = create_test_professional(&pool).await;
        app.post("/services")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "professionalId": other.id, "name": "Haircut", "price": 10, "durationMinutes": 30 }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // A professional without a profile yet
        let bare = create_test_user(&pool, Role::Professional).await;
        let headers = add_auth_headers(&bare);
        app.post("/services")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "name": "Haircut", "price": 10, "durationMinutes": 30 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_and_delete_service(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let professional = create_test_professional(&pool).await;
        let service = create_test_service(&pool, professional.id).await;
        let owner = get_user(&pool, professional.user_id).await;
        let stranger = create_test_user(&pool, Role::Professional).await;

        let headers = add_auth_headers(&stranger);
        app.put(&format!("/services/{}", service.id))
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "price": 1 }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let headers = add_auth_headers(&owner);
        let updated: ServiceResponse = app
            .put(&format!("/services/{}", service.id))
            .add_header(&headers[0].0, &headers[0].1)
            .json(&json!({ "price": "50.00", "isActive": false }))
            .await
            .json();
        assert_eq!(updated.price, Decimal::from_str("50.00").unwrap());
        assert!(!updated.is_active);

        // Inactive services are hidden unless asked for
        let page: PaginatedResponse<ServiceResponse> = app.get("/services").await.json();
        assert_eq!(page.total_count, 0);
        let page: PaginatedResponse<ServiceResponse> = app.get("/services?includeInactive=true").await.json();
        assert_eq!(page.total_count, 1);

        let admin = create_test_admin_user(&pool).await;
        let headers = add_auth_headers(&admin);
        app.delete(&format!("/services/{}", service.id))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/services/{}", service.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
