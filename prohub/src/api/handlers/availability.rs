use crate::api::models::availability::{
    AvailabilityCreate, AvailabilityQuery, AvailabilityResponse, AvailabilityUpdate, validate_slot,
};
use crate::api::models::clock::format_clock_time;
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::db::handlers::{Availability, Professionals, Repository};
use crate::db::models::availability::{
    AvailabilityCreateDBRequest, AvailabilityDBResponse, AvailabilityFilter, AvailabilityUpdateDBRequest,
};
use crate::errors::{Error, Result};
use crate::types::{AvailabilityId, Operation, ProfessionalId, Resource, UserId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgConnection;

async fn professional_owner(conn: &mut PgConnection, id: ProfessionalId) -> Result<UserId> {
    let professional = Professionals::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Professional".to_string(),
        id: id.to_string(),
    })?;
    Ok(professional.user_id)
}

async fn load_slot(conn: &mut PgConnection, id: AvailabilityId) -> Result<AvailabilityDBResponse> {
    Availability::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Availability".to_string(),
        id: id.to_string(),
    })
}

/// Reject empty slots and slots that overlap another one on the same day
async fn check_slot(
    conn: &mut PgConnection,
    professional_id: ProfessionalId,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<AvailabilityId>,
) -> Result<()> {
    validate_slot(start, end).map_err(|message| Error::Validation {
        message: "Invalid availability slot".to_string(),
        errors: vec![message],
    })?;

    // Concurrent writers for the same professional queue here until the first commits
    if !Professionals::new(&mut *conn).lock(professional_id).await? {
        return Err(Error::NotFound {
            resource: "Professional".to_string(),
            id: professional_id.to_string(),
        });
    }

    if let Some(existing) = Availability::new(conn)
        .find_overlap(professional_id, date, start, end, exclude)
        .await?
    {
        return Err(Error::Conflict {
            message: format!(
                "Slot overlaps an existing slot from {} to {} on {}",
                format_clock_time(&existing.start_time),
                format_clock_time(&existing.end_time),
                existing.date
            ),
        });
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/available/professional/{id}",
    tag = "availability",
    summary = "List availability",
    description = "Public. Slots are ordered by date and start time.",
    params(("id" = uuid::Uuid, Path, description = "Professional ID"), AvailabilityQuery),
    responses(
        (status = 200, description = "Availability slots", body = Vec<AvailabilityResponse>),
        (status = 400, description = "`from` is after `to`"),
        (status = 404, description = "Professional not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_availability(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<AvailabilityResponse>>> {
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(Error::BadRequest {
            message: "`from` must not be after `to`".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    professional_owner(&mut conn, professional_id).await?;

    let slots = Availability::new(&mut conn)
        .list(&AvailabilityFilter {
            professional_id,
            from: query.from,
            to: query.to,
        })
        .await?;

    Ok(Json(slots.into_iter().map(AvailabilityResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/available/professional/{id}",
    tag = "availability",
    summary = "Create availability slot",
    request_body = AvailabilityCreate,
    params(("id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 201, description = "Slot created", body = AvailabilityResponse),
        (status = 400, description = "End time is not after start time"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Professional not found"),
        (status = 409, description = "Overlaps an existing slot"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_availability(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
    current_user: RequiresPermission<resource::Availability, operation::CreateOwn>,
    Json(create): Json<AvailabilityCreate>,
) -> Result<(StatusCode, Json<AvailabilityResponse>)> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let owner_id = professional_owner(&mut tx, professional_id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Availability, Operation::CreateOwn)?;

    check_slot(&mut tx, professional_id, create.date, create.start_time, create.end_time, None).await?;

    let slot = Availability::new(&mut tx)
        .create(&AvailabilityCreateDBRequest {
            professional_id,
            date: create.date,
            start_time: create.start_time,
            end_time: create.end_time,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(slot.into())))
}

#[utoipa::path(
    put,
    path = "/available/{slot_id}",
    tag = "availability",
    summary = "Update availability slot",
    request_body = AvailabilityUpdate,
    params(("slot_id" = uuid::Uuid, Path, description = "Slot ID")),
    responses(
        (status = 200, description = "Slot updated", body = AvailabilityResponse),
        (status = 400, description = "End time is not after start time"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Slot not found"),
        (status = 409, description = "Overlaps an existing slot"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_availability(
    State(state): State<AppState>,
    Path(slot_id): Path<AvailabilityId>,
    current_user: CurrentUser,
    Json(update): Json<AvailabilityUpdate>,
) -> Result<Json<AvailabilityResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let existing = load_slot(&mut tx, slot_id).await?;
    let owner_id = professional_owner(&mut tx, existing.professional_id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Availability, Operation::UpdateOwn)?;

    check_slot(
        &mut tx,
        existing.professional_id,
        update.date.unwrap_or(existing.date),
        update.start_time.unwrap_or(existing.start_time),
        update.end_time.unwrap_or(existing.end_time),
        Some(slot_id),
    )
    .await?;

    let slot = Availability::new(&mut tx)
        .update(
            slot_id,
            &AvailabilityUpdateDBRequest {
                date: update.date,
                start_time: update.start_time,
                end_time: update.end_time,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(slot.into()))
}

#[utoipa::path(
    delete,
    path = "/available/{slot_id}",
    tag = "availability",
    summary = "Delete availability slot",
    params(("slot_id" = uuid::Uuid, Path, description = "Slot ID")),
    responses(
        (status = 204, description = "Slot deleted"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Slot not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_availability(
    State(state): State<AppState>,
    Path(slot_id): Path<AvailabilityId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = load_slot(&mut conn, slot_id).await?;
    let owner_id = professional_owner(&mut conn, existing.professional_id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Availability, Operation::DeleteOwn)?;

    Availability::new(&mut conn).delete(slot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
