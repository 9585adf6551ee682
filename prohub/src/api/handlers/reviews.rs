use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::reservations::ReservationStatus;
use crate::api::models::reviews::{ListReviewsQuery, ReviewCreate, ReviewResponse, ReviewStatus, ReviewStatusUpdate};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::db::handlers::{Professionals, Repository, Reservations, Reviews};
use crate::db::models::reviews::{ReviewCreateDBRequest, ReviewFilter, ReviewUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{Operation, Permission, ProfessionalId, Resource, ReviewId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use tracing::debug;

fn review_not_found(id: ReviewId) -> Error {
    Error::NotFound {
        resource: "Review".to_string(),
        id: id.to_string(),
    }
}

async fn recompute_rating(conn: &mut PgConnection, professional_id: ProfessionalId) -> Result<()> {
    let (average, count) = Professionals::new(conn).recompute_rating(professional_id).await?;
    debug!(professional_id = %professional_id, average, count, "Rating recomputed");
    Ok(())
}

async fn list_with_filter(state: &AppState, filter: ReviewFilter) -> Result<Json<PaginatedResponse<ReviewResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reviews::new(&mut conn);
    let reviews = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        reviews.into_iter().map(ReviewResponse::from).collect(),
        total_count,
        filter.skip,
        filter.limit,
    )))
}

#[utoipa::path(
    get,
    path = "/reviews",
    tag = "reviews",
    summary = "List reviews",
    description = "Anyone can list approved reviews. Admins may filter by any moderation status.",
    params(ListReviewsQuery),
    responses(
        (status = 200, description = "Paginated list of reviews", body = PaginatedResponse<ReviewResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ListReviewsQuery>,
    current_user: Option<CurrentUser>,
) -> Result<Json<PaginatedResponse<ReviewResponse>>> {
    let (skip, limit) = query.pagination.params();
    let moderator = current_user.is_some_and(|user| user.is_admin());
    let status = if moderator { query.status } else { Some(ReviewStatus::Approved) };

    list_with_filter(
        &state,
        ReviewFilter {
            skip,
            limit,
            professional_id: query.professional_id,
            status,
        },
    )
    .await
}

#[utoipa::path(
    get,
    path = "/professional/{id}/reviews",
    tag = "reviews",
    summary = "List a professional's reviews",
    params(("id" = uuid::Uuid, Path, description = "Professional ID"), Pagination),
    responses(
        (status = 200, description = "Approved reviews, newest first", body = PaginatedResponse<ReviewResponse>),
        (status = 404, description = "Professional not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_professional_reviews(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<ReviewResponse>>> {
    {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        if Professionals::new(&mut conn).get_by_id(professional_id).await?.is_none() {
            return Err(Error::NotFound {
                resource: "Professional".to_string(),
                id: professional_id.to_string(),
            });
        }
    }

    let (skip, limit) = pagination.params();
    list_with_filter(
        &state,
        ReviewFilter {
            skip,
            limit,
            professional_id: Some(professional_id),
            status: Some(ReviewStatus::Approved),
        },
    )
    .await
}

#[utoipa::path(
    post,
    path = "/reviews",
    tag = "reviews",
    summary = "Create review",
    description = "Customers review their own completed reservations, once per reservation.",
    request_body = ReviewCreate,
    responses(
        (status = 201, description = "Review created", body = ReviewResponse),
        (status = 400, description = "Invalid rating, or the reservation is not completed"),
        (status = 403, description = "Not the customer who booked"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "The reservation already has a review"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_review(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Reviews, operation::CreateOwn>,
    Json(create): Json<ReviewCreate>,
) -> Result<(StatusCode, Json<ReviewResponse>)> {
    create.validate().map_err(|message| Error::Validation {
        message: "Invalid review".to_string(),
        errors: vec![message],
    })?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let reservation = Reservations::new(&mut tx)
        .get_by_id(create.reservation_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Reservation".to_string(),
            id: create.reservation_id.to_string(),
        })?;
    if reservation.user_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            required: Permission::Owner,
            action: Operation::CreateOwn,
            resource: Resource::Reviews.to_string(),
        });
    }
    if reservation.professional_id != create.professional_id {
        return Err(Error::BadRequest {
            message: "The reservation was not made with this professional".to_string(),
        });
    }
    if reservation.status != ReservationStatus::Completed {
        return Err(Error::BadRequest {
            message: format!("Only completed reservations can be reviewed, this one is {}", reservation.status),
        });
    }

    let status = if state.config.reviews.require_moderation {
        ReviewStatus::Pending
    } else {
        ReviewStatus::Approved
    };
    let review = Reviews::new(&mut tx)
        .create(&ReviewCreateDBRequest {
            professional_id: create.professional_id,
            user_id: current_user.id,
            reservation_id: Some(create.reservation_id),
            rating: create.rating,
            comment: create.comment.filter(|c| !c.trim().is_empty()),
            status,
        })
        .await?;
    if status == ReviewStatus::Approved {
        recompute_rating(&mut tx, review.professional_id).await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(review.into())))
}

#[utoipa::path(
    patch,
    path = "/reviews/{id}/status",
    tag = "reviews",
    summary = "Moderate review",
    request_body = ReviewStatusUpdate,
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review updated", body = ReviewResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Review not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_review_status(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    _: RequiresPermission<resource::Reviews, operation::UpdateAll>,
    Json(update): Json<ReviewStatusUpdate>,
) -> Result<Json<ReviewResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let review = Reviews::new(&mut tx)
        .update(id, &ReviewUpdateDBRequest { status: update.status })
        .await?;
    recompute_rating(&mut tx, review.professional_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(review.into()))
}

#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    summary = "Delete review",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let review = Reviews::new(&mut tx).get_by_id(id).await?.ok_or_else(|| review_not_found(id))?;
    permissions::require_owner(&current_user, review.user_id, Resource::Reviews, Operation::DeleteOwn)?;

    Reviews::new(&mut tx).delete(id).await?;
    recompute_rating(&mut tx, review.professional_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(StatusCode::NO_CONTENT)
}
