use crate::api::models::clock::format_clock_time;
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::reservations::{
    ListReservationsQuery, ReservationActor, ReservationCreate, ReservationResponse, ReservationStatus, ReservationUpdate,
};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::db::handlers::{Professionals, Repository, Reservations, Services, Users};
use crate::db::models::reservations::{
    ReservationCreateDBRequest, ReservationDBResponse, ReservationFilter, ReservationUpdateDBRequest,
};
use crate::email::{EmailService, ReservationEmail};
use crate::errors::{Error, Result};
use crate::types::{Operation, Permission, ProfessionalId, ReservationId, Resource, UserId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use tracing::{info, warn};

/// Serialize bookings for one professional so the conflict check sees concurrent inserts
async fn lock_professional(conn: &mut PgConnection, id: ProfessionalId) -> Result<()> {
    if Professionals::new(conn).lock(id).await? {
        Ok(())
    } else {
        Err(Error::NotFound {
            resource: "Professional".to_string(),
            id: id.to_string(),
        })
    }
}

/// How the caller relates to a reservation, if at all
fn actor_for(user: &CurrentUser, reservation: &ReservationDBResponse) -> Result<ReservationActor> {
    if user.is_admin() {
        Ok(ReservationActor::Admin)
    } else if reservation.professional_user_id == user.id {
        Ok(ReservationActor::Provider)
    } else if reservation.user_id == user.id {
        Ok(ReservationActor::Customer)
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Any(vec![Permission::Owner, Permission::Allow(Resource::Reservations, Operation::ReadAll)]),
            action: Operation::ReadOwn,
            resource: Resource::Reservations.to_string(),
        })
    }
}

async fn load_reservation(conn: &mut PgConnection, id: ReservationId) -> Result<ReservationDBResponse> {
    Reservations::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Reservation".to_string(),
        id: id.to_string(),
    })
}

fn email_details(reservation: &ReservationDBResponse) -> ReservationEmail {
    ReservationEmail {
        customer_name: reservation.customer_name.clone().unwrap_or_else(|| "A customer".to_string()),
        professional_name: reservation
            .professional_name
            .clone()
            .unwrap_or_else(|| "your professional".to_string()),
        service_name: reservation.service_name.clone().unwrap_or_else(|| "a service".to_string()),
        date: reservation.date,
        time: reservation.start_time.as_ref().map(format_clock_time),
        notes: reservation.notes.clone(),
    }
}

enum Notification {
    Created,
    StatusChanged(ReservationStatus),
}

async fn send_notification(state: &AppState, reservation: &ReservationDBResponse, notification: &Notification) -> Result<()> {
    let recipient_id: UserId = match notification {
        Notification::Created => reservation.professional_user_id,
        Notification::StatusChanged(_) => reservation.user_id,
    };
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let Some(recipient) = Users::new(&mut conn).get_by_id(recipient_id).await? else {
        return Ok(());
    };
    drop(conn);

    let email_service = EmailService::new(&state.config)?;
    let details = email_details(reservation);
    let name = recipient.display_name.as_deref();
    match notification {
        Notification::Created => {
            email_service
                .send_reservation_created_email(&recipient.email, name, &details)
                .await
        }
        Notification::StatusChanged(status) => {
            email_service
                .send_reservation_status_email(&recipient.email, name, &details, *status)
                .await
        }
    }
}

/// Notification failures never fail the request that triggered them
async fn notify(state: &AppState, reservation: &ReservationDBResponse, notification: Notification) {
    if let Err(e) = send_notification(state, reservation, &notification).await {
        warn!(reservation_id = %reservation.id, "Failed to send reservation email: {}", e);
    }
}

async fn list_with_filter(
    state: &AppState,
    filter: ReservationFilter,
) -> Result<Json<PaginatedResponse<ReservationResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reservations::new(&mut conn);
    let reservations = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        reservations.into_iter().map(ReservationResponse::from).collect(),
        total_count,
        filter.skip,
        filter.limit,
    )))
}

#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    summary = "Create reservation",
    description = "Books a service. Customers may only book for themselves. \
        An active reservation for the same professional, date and time is a conflict.",
    request_body = ReservationCreate,
    responses(
        (status = 201, description = "Reservation created", body = ReservationResponse),
        (status = 400, description = "Missing fields or the service does not belong to the professional"),
        (status = 403, description = "Booking on behalf of someone else"),
        (status = 404, description = "Service not found"),
        (status = 409, description = "The slot is already taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_reservation(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Reservations, operation::CreateOwn>,
    Json(create): Json<ReservationCreate>,
) -> Result<(StatusCode, Json<ReservationResponse>)> {
    let create = create.validate().map_err(|errors| Error::Validation {
        message: "Missing required reservation fields".to_string(),
        errors,
    })?;

    if create.user_id != current_user.id && !current_user.is_admin() {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Reservations, Operation::CreateAll),
            action: Operation::CreateAll,
            resource: Resource::Reservations.to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let service = Services::new(&mut tx)
        .get_by_id(create.service_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Service".to_string(),
            id: create.service_id.to_string(),
        })?;
    if service.professional_id != create.professional_id {
        return Err(Error::BadRequest {
            message: "The service is not offered by this professional".to_string(),
        });
    }
    if !service.is_active {
        return Err(Error::BadRequest {
            message: "The service is not currently offered".to_string(),
        });
    }

    lock_professional(&mut tx, create.professional_id).await?;
    let mut repo = Reservations::new(&mut tx);
    if repo
        .find_conflict(create.professional_id, create.date, create.time, None)
        .await?
        .is_some()
    {
        return Err(Error::Conflict {
            message: "The professional already has a reservation at this date and time".to_string(),
        });
    }

    let reservation = repo
        .create(&ReservationCreateDBRequest {
            user_id: create.user_id,
            professional_id: create.professional_id,
            service_id: create.service_id,
            date: create.date,
            start_time: create.time,
            notes: create.notes,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(reservation_id = %reservation.id, "Reservation created");
    notify(&state, &reservation, Notification::Created).await;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    summary = "List reservations",
    description = "Admins see every reservation and may filter by customer. Everyone else sees the reservations \
        they take part in.",
    params(ListReservationsQuery),
    responses(
        (status = 200, description = "Paginated list of reservations", body = PaginatedResponse<ReservationResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ListReservationsQuery>,
    current_user: RequiresPermission<resource::Reservations, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<ReservationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = ReservationFilter {
        skip,
        limit,
        professional_id: query.professional_id,
        status: query.status,
        from: query.from,
        to: query.to,
        ..Default::default()
    };
    if current_user.is_admin() {
        filter.user_id = query.user_id;
    } else {
        filter.participant = Some(current_user.id);
    }

    list_with_filter(&state, filter).await
}

#[utoipa::path(
    get,
    path = "/reservations/me",
    tag = "reservations",
    summary = "My reservations",
    description = "Reservations the caller booked and, for professionals, the ones booked with them.",
    params(ListReservationsQuery),
    responses(
        (status = 200, description = "Paginated list of reservations", body = PaginatedResponse<ReservationResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_reservations(
    State(state): State<AppState>,
    Query(query): Query<ListReservationsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<ReservationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ReservationFilter {
        skip,
        limit,
        participant: Some(current_user.id),
        professional_id: query.professional_id,
        status: query.status,
        from: query.from,
        to: query.to,
        ..Default::default()
    };

    list_with_filter(&state, filter).await
}

#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    summary = "Get reservation",
    params(("id" = uuid::Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = ReservationResponse),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Reservation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
    current_user: CurrentUser,
) -> Result<Json<ReservationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let reservation = load_reservation(&mut conn, id).await?;
    actor_for(&current_user, &reservation)?;
    Ok(Json(reservation.into()))
}

#[utoipa::path(
    put,
    path = "/reservations/{id}",
    tag = "reservations",
    summary = "Update reservation",
    description = "Cancelled, completed and no-show reservations are final. Only the professional or an admin may \
        confirm, complete or mark a no-show. A customer moving the date or time reschedules the reservation.",
    request_body = ReservationUpdate,
    params(("id" = uuid::Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation updated", body = ReservationResponse),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "The new slot is already taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
    current_user: CurrentUser,
    Json(update): Json<ReservationUpdate>,
) -> Result<Json<ReservationResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if !Reservations::new(&mut tx).lock(id).await? {
        return Err(Error::NotFound {
            resource: "Reservation".to_string(),
            id: id.to_string(),
        });
    }
    let existing = load_reservation(&mut tx, id).await?;
    let actor = actor_for(&current_user, &existing)?;

    let moves = update.date.is_some_and(|d| d != existing.date) || update.time.is_some_and(|t| Some(t) != existing.start_time);
    if moves && existing.status.is_terminal() {
        return Err(Error::BadRequest {
            message: format!("Reservation is {} and can no longer be moved", existing.status),
        });
    }

    let mut next_status = update.status;
    if moves && next_status.is_none() && actor == ReservationActor::Customer {
        next_status = Some(ReservationStatus::Rescheduled);
    }
    if let Some(next) = next_status {
        existing
            .status
            .check_transition(next, actor)
            .map_err(|message| Error::BadRequest { message })?;
    }

    let resulting_status = next_status.unwrap_or(existing.status);
    if moves && ReservationStatus::ACTIVE.contains(&resulting_status) {
        let date = update.date.unwrap_or(existing.date);
        let time = update.time.or(existing.start_time);
        lock_professional(&mut tx, existing.professional_id).await?;
        if Reservations::new(&mut tx)
            .find_conflict(existing.professional_id, date, time, Some(id))
            .await?
            .is_some()
        {
            return Err(Error::Conflict {
                message: "The professional already has a reservation at this date and time".to_string(),
            });
        }
    }

    let reservation = Reservations::new(&mut tx)
        .update(
            id,
            &ReservationUpdateDBRequest {
                date: update.date,
                start_time: update.time,
                status: next_status,
                notes: update.notes,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    if reservation.status != existing.status {
        info!(reservation_id = %id, from = %existing.status, to = %reservation.status, "Reservation status changed");
        notify(&state, &reservation, Notification::StatusChanged(reservation.status)).await;
    }

    Ok(Json(reservation.into()))
}

#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "reservations",
    summary = "Delete reservation",
    params(("id" = uuid::Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 204, description = "Reservation deleted"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Reservation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let reservation = load_reservation(&mut conn, id).await?;
    actor_for(&current_user, &reservation)?;

    Reservations::new(&mut conn).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
