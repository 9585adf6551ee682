use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::professionals::{ListProfessionalsQuery, ProfessionalCreate, ProfessionalResponse, ProfessionalUpdate};
use crate::api::models::services::ServiceResponse;
use crate::api::models::users::{CurrentUser, Role};
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::auth::session;
use crate::db::handlers::{Professionals, Repository, Services, Users};
use crate::db::models::professionals::{
    ProfessionalCreateDBRequest, ProfessionalDBResponse, ProfessionalFilter, ProfessionalUpdateDBRequest,
};
use crate::db::models::users::UserUpdateDBRequest;
use crate::errors::{Error, Result};
use crate::geo::{BoundingBox, Coordinates, haversine_km};
use crate::types::{Operation, ProfessionalId, Resource};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use sqlx::PgConnection;

/// Check coordinates and radius as they would be stored
fn validate_location(latitude: Option<f64>, longitude: Option<f64>, service_radius_km: Option<f64>) -> Result<()> {
    let mut errors = Vec::new();
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => {
            if let Err(e) = Coordinates::new(lat, lng) {
                errors.push(e);
            }
        }
        (None, None) => {}
        _ => errors.push("latitude and longitude must be provided together".to_string()),
    }
    if service_radius_km.is_some_and(|r| !r.is_finite() || r <= 0.0) {
        errors.push("serviceRadiusKm must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation {
            message: "Invalid professional profile".to_string(),
            errors,
        })
    }
}

async fn load_professional(conn: &mut PgConnection, id: ProfessionalId) -> Result<ProfessionalDBResponse> {
    Professionals::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Professional".to_string(),
        id: id.to_string(),
    })
}

/// Radius search: bounding box in SQL, exact distance here, nearest first
async fn search_by_distance(
    conn: &mut PgConnection,
    mut filter: ProfessionalFilter,
    origin: Coordinates,
    radius_km: Option<f64>,
) -> Result<Vec<(ProfessionalDBResponse, f64)>> {
    filter.geolocated_only = true;
    filter.within = radius_km.map(|radius| BoundingBox::around(origin, radius));

    let mut matches: Vec<(ProfessionalDBResponse, f64)> = Professionals::new(conn)
        .list_unpaginated(&filter)
        .await?
        .into_iter()
        .filter_map(|professional| {
            let location = Coordinates::from_optional(professional.latitude, professional.longitude)?;
            let distance = haversine_km(origin, location);
            let reach = radius_km.unwrap_or(professional.service_radius_km);
            (distance <= reach).then_some((professional, distance))
        })
        .collect();

    matches.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(matches)
}

#[utoipa::path(
    get,
    path = "/professional",
    tag = "professionals",
    summary = "Search professionals",
    description = "Free-text, speciality, category and rating filters. With `lat` and `lng` only professionals \
        within `radiusKm` (or their own service radius when omitted) are returned, nearest first, with `distanceKm`.",
    params(ListProfessionalsQuery),
    responses(
        (status = 200, description = "Paginated list of professionals", body = PaginatedResponse<ProfessionalResponse>),
        (status = 400, description = "Invalid search coordinates"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_professionals(
    State(state): State<AppState>,
    Query(query): Query<ListProfessionalsQuery>,
) -> Result<Json<PaginatedResponse<ProfessionalResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ProfessionalFilter {
        skip,
        limit,
        search: query.q.filter(|q| !q.trim().is_empty()),
        speciality: query.speciality.filter(|s| !s.trim().is_empty()),
        category_id: query.category_id,
        min_rating: query.min_rating,
        ..Default::default()
    };

    let origin = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng).map_err(|message| Error::BadRequest { message })?),
        (None, None) => None,
        _ => {
            return Err(Error::BadRequest {
                message: "lat and lng must be provided together".to_string(),
            });
        }
    };
    if query.radius_km.is_some_and(|r| !r.is_finite() || r <= 0.0) {
        return Err(Error::BadRequest {
            message: "radiusKm must be greater than 0".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let Some(origin) = origin else {
        let mut repo = Professionals::new(&mut conn);
        let professionals = repo.list(&filter).await?;
        let total_count = repo.count(&filter).await?;
        return Ok(Json(PaginatedResponse::new(
            professionals.into_iter().map(ProfessionalResponse::from).collect(),
            total_count,
            skip,
            limit,
        )));
    };

    let matches = search_by_distance(&mut conn, filter, origin, query.radius_km).await?;
    let total_count = matches.len() as i64;
    let page = matches
        .into_iter()
        .skip(skip as usize)
        .take(limit as usize)
        .map(|(professional, distance)| ProfessionalResponse::from(professional).with_distance(distance))
        .collect();

    Ok(Json(PaginatedResponse::new(page, total_count, skip, limit)))
}

#[utoipa::path(
    post,
    path = "/professional",
    tag = "professionals",
    summary = "Become a professional",
    description = "Creates the caller's professional profile and switches the account to the professional role. \
        A refreshed session cookie carrying the new role is set.",
    request_body = ProfessionalCreate,
    responses(
        (status = 201, description = "Profile created", body = ProfessionalResponse),
        (status = 400, description = "Invalid profile"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "The caller already has a profile"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_professional(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Professionals, operation::CreateOwn>,
    Json(create): Json<ProfessionalCreate>,
) -> Result<Response> {
    validate_location(create.latitude, create.longitude, create.service_radius_km)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if Professionals::new(&mut tx).get_by_user_id(current_user.id).await?.is_some() {
        return Err(Error::Conflict {
            message: "A professional profile already exists for this user".to_string(),
        });
    }

    let professional = Professionals::new(&mut tx)
        .create(&ProfessionalCreateDBRequest::new(current_user.id, create))
        .await?;

    let mut user = current_user.into_inner();
    if user.role == Role::Customer {
        let update = UserUpdateDBRequest {
            role: Some(Role::Professional),
            ..Default::default()
        };
        user = CurrentUser::from(Users::new(&mut tx).update(user.id, &update).await?);
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let token = session::create_session_token(&user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(ProfessionalResponse::from(professional)),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/professional/me",
    tag = "professionals",
    summary = "Get my professional profile",
    description = "Includes inactive services.",
    responses(
        (status = 200, description = "The caller's profile", body = ProfessionalResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "The caller has no profile"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_my_professional(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<ProfessionalResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let professional = Professionals::new(&mut conn)
        .get_by_user_id(current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Professional".to_string(),
            id: "me".to_string(),
        })?;
    let services = Services::new(&mut conn).list_for_professional(professional.id, true).await?;

    Ok(Json(
        ProfessionalResponse::from(professional).with_services(services.into_iter().map(ServiceResponse::from).collect()),
    ))
}

#[utoipa::path(
    get,
    path = "/professional/{id}",
    tag = "professionals",
    summary = "Get professional",
    description = "Public profile with active services.",
    params(("id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 200, description = "Professional profile", body = ProfessionalResponse),
        (status = 404, description = "Professional not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_professional(State(state): State<AppState>, Path(id): Path<ProfessionalId>) -> Result<Json<ProfessionalResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let professional = load_professional(&mut conn, id).await?;
    let services = Services::new(&mut conn).list_for_professional(id, false).await?;

    Ok(Json(
        ProfessionalResponse::from(professional).with_services(services.into_iter().map(ServiceResponse::from).collect()),
    ))
}

#[utoipa::path(
    put,
    path = "/professional/{id}",
    tag = "professionals",
    summary = "Update professional",
    request_body = ProfessionalUpdate,
    params(("id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 200, description = "Profile updated", body = ProfessionalResponse),
        (status = 400, description = "Invalid profile"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Professional not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_professional(
    State(state): State<AppState>,
    Path(id): Path<ProfessionalId>,
    current_user: CurrentUser,
    Json(update): Json<ProfessionalUpdate>,
) -> Result<Json<ProfessionalResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let existing = load_professional(&mut tx, id).await?;
    permissions::require_owner(&current_user, existing.user_id, Resource::Professionals, Operation::UpdateOwn)?;

    // Validate the coordinates the row will end up with
    validate_location(
        update.latitude.or(existing.latitude),
        update.longitude.or(existing.longitude),
        update.service_radius_km,
    )?;

    let professional = Professionals::new(&mut tx)
        .update(id, &ProfessionalUpdateDBRequest::from(update))
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(ProfessionalResponse::from(professional)))
}

#[utoipa::path(
    delete,
    path = "/professional/{id}",
    tag = "professionals",
    summary = "Delete professional",
    description = "Deletes the profile with its services, availability, images and reviews. \
        The account goes back to the customer role.",
    params(("id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Professional not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_professional(
    State(state): State<AppState>,
    Path(id): Path<ProfessionalId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let existing = load_professional(&mut tx, id).await?;
    permissions::require_owner(&current_user, existing.user_id, Resource::Professionals, Operation::DeleteOwn)?;

    Professionals::new(&mut tx).delete(id).await?;

    let mut users = Users::new(&mut tx);
    if let Some(owner) = users.get_by_id(existing.user_id).await?
        && owner.role == Role::Professional
    {
        let update = UserUpdateDBRequest {
            role: Some(Role::Customer),
            ..Default::default()
        };
        users.update(owner.id, &update).await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(StatusCode::NO_CONTENT)
}
