use crate::api::models::messaging::{
    ConversationCreate, ConversationResponse, ListMessagesQuery, MarkReadResponse, MessageCreate, MessageResponse,
};
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{RequiresPermission, operation, resource};
use crate::db::handlers::{Conversations, Professionals, Repository};
use crate::db::models::messaging::{ConversationDBResponse, MessageCreateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{ConversationId, Operation, Permission, Resource};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

/// Load a conversation the caller takes part in
async fn load_conversation(
    conn: &mut PgConnection,
    id: ConversationId,
    user: &CurrentUser,
) -> Result<ConversationDBResponse> {
    let conversation = Conversations::new(conn)
        .get_by_id(id, user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Conversation".to_string(),
            id: id.to_string(),
        })?;

    if !conversation.is_participant(user.id) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Owner,
            action: Operation::ReadOwn,
            resource: Resource::Conversations.to_string(),
        });
    }
    Ok(conversation)
}

#[utoipa::path(
    get,
    path = "/conversations",
    tag = "conversations",
    summary = "List conversations",
    description = "Conversations the caller takes part in, most recently active first.",
    params(Pagination),
    responses(
        (status = 200, description = "Paginated list of conversations", body = PaginatedResponse<ConversationResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<ConversationResponse>>> {
    let (skip, limit) = pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Conversations::new(&mut conn);
    let conversations = repo.list_for_user(current_user.id, skip, limit).await?;
    let total_count = repo.count_for_user(current_user.id).await?;

    Ok(Json(PaginatedResponse::new(
        conversations.into_iter().map(ConversationResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/conversations",
    tag = "conversations",
    summary = "Open conversation",
    description = "Returns the caller's conversation with the professional, creating it on first contact.",
    request_body = ConversationCreate,
    responses(
        (status = 200, description = "Conversation", body = ConversationResponse),
        (status = 400, description = "Cannot message your own profile"),
        (status = 404, description = "Professional not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_conversation(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Conversations, operation::CreateOwn>,
    Json(create): Json<ConversationCreate>,
) -> Result<Json<ConversationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let professional = Professionals::new(&mut conn)
        .get_by_id(create.professional_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Professional".to_string(),
            id: create.professional_id.to_string(),
        })?;
    if professional.user_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot start a conversation with your own profile".to_string(),
        });
    }

    let conversation = Conversations::new(&mut conn)
        .get_or_create(current_user.id, create.professional_id)
        .await?;
    Ok(Json(conversation.into()))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    tag = "conversations",
    summary = "List messages",
    description = "Oldest first.",
    params(("id" = uuid::Uuid, Path, description = "Conversation ID"), ListMessagesQuery),
    responses(
        (status = 200, description = "Paginated list of messages", body = PaginatedResponse<MessageResponse>),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Query(query): Query<ListMessagesQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<MessageResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    load_conversation(&mut conn, id, &current_user).await?;

    let mut repo = Conversations::new(&mut conn);
    let messages = repo.list_messages(id, skip, limit).await?;
    let total_count = repo.count_messages(id).await?;

    Ok(Json(PaginatedResponse::new(
        messages.into_iter().map(MessageResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    tag = "conversations",
    summary = "Send message",
    request_body = MessageCreate,
    params(("id" = uuid::Uuid, Path, description = "Conversation ID")),
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Empty or oversized message"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    current_user: CurrentUser,
    Json(create): Json<MessageCreate>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    create.validate().map_err(|message| Error::Validation {
        message: "Invalid message".to_string(),
        errors: vec![message],
    })?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    load_conversation(&mut tx, id, &current_user).await?;
    let message = Conversations::new(&mut tx)
        .add_message(&MessageCreateDBRequest {
            conversation_id: id,
            sender_id: current_user.id,
            body: create.body.trim().to_string(),
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/read",
    tag = "conversations",
    summary = "Mark conversation read",
    description = "Marks every message from the other participant as read.",
    params(("id" = uuid::Uuid, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Number of messages marked read", body = MarkReadResponse),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    current_user: CurrentUser,
) -> Result<Json<MarkReadResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    load_conversation(&mut conn, id, &current_user).await?;
    let marked = Conversations::new(&mut conn).mark_read(id, current_user.id).await?;

    Ok(Json(MarkReadResponse {
        marked_read: marked as i64,
    }))
}
