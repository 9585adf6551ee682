use crate::api::models::images::{ImageResponse, ImageUploadForm, ProfileImageResponse};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{self, RequiresPermission, operation, resource};
use crate::config::StorageConfig;
use crate::db::handlers::{Images, Professionals, Repository};
use crate::db::models::images::ImageCreateDBRequest;
use crate::db::models::professionals::ProfessionalUpdateDBRequest;
use crate::errors::{Error, Result};
use crate::storage::{self, ImageStore};
use crate::types::{ImageId, Operation, ProfessionalId, Resource, UserId};
use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::{Bytes, BytesMut};
use sqlx::PgConnection;
use std::sync::Arc;
use tracing::{info, warn};

/// A single image pulled out of a multipart body
struct ImageUpload {
    data: Bytes,
    content_type: String,
    description: Option<String>,
}

fn image_store(state: &AppState) -> Result<Arc<dyn ImageStore>> {
    state.storage.clone().ok_or_else(|| Error::ServiceUnavailable {
        message: "Image uploads are not configured".to_string(),
    })
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { message: e.body_text() }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        }
    }
}

/// Read the `file` field (and optional `description`) enforcing type and size limits
async fn read_image_form(mut multipart: Multipart, max_bytes: usize) -> Result<ImageUpload> {
    let mut file: Option<(Bytes, String)> = None;
    let mut description = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or("") {
            "file" => {
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_ascii_lowercase();
                if !storage::is_allowed_image_type(&content_type) {
                    return Err(Error::BadRequest {
                        message: format!(
                            "Unsupported content type '{content_type}', expected one of: {}",
                            storage::ALLOWED_IMAGE_TYPES.join(", ")
                        ),
                    });
                }

                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    data.extend_from_slice(&chunk);
                    // Fail as soon as the limit is crossed rather than buffering the rest
                    if data.len() > max_bytes {
                        return Err(Error::PayloadTooLarge {
                            message: format!("Image exceeds the maximum size of {max_bytes} bytes"),
                        });
                    }
                }
                if data.is_empty() {
                    return Err(Error::BadRequest {
                        message: "Uploaded file is empty".to_string(),
                    });
                }
                file = Some((data.freeze(), content_type));
            }
            "description" => {
                let text = field.text().await.map_err(multipart_error)?;
                description = Some(text.trim().to_string()).filter(|d| !d.is_empty());
            }
            _ => {}
        }
    }

    let (data, content_type) = file.ok_or_else(|| Error::BadRequest {
        message: "Multipart field 'file' is required".to_string(),
    })?;
    Ok(ImageUpload {
        data,
        content_type,
        description,
    })
}

async fn professional_owner(conn: &mut PgConnection, id: ProfessionalId) -> Result<UserId> {
    let professional = Professionals::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Professional".to_string(),
        id: id.to_string(),
    })?;
    Ok(professional.user_id)
}

/// Best-effort removal of an object that is no longer referenced
async fn discard(store: &dyn ImageStore, key: &str) {
    if let Err(e) = store.delete(key).await {
        warn!(key, "Failed to delete stored image: {}", e);
    }
}

#[utoipa::path(
    put,
    path = "/upload-img/{professional_id}/profile-image",
    tag = "uploads",
    summary = "Replace profile image",
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    params(("professional_id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 200, description = "Profile image replaced", body = ProfileImageResponse),
        (status = 400, description = "Missing file or unsupported content type"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Professional not found"),
        (status = 413, description = "Image too large"),
        (status = 503, description = "Uploads not configured"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_profile_image(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
    current_user: RequiresPermission<resource::Images, operation::CreateOwn>,
    multipart: Multipart,
) -> Result<Json<ProfileImageResponse>> {
    let store = image_store(&state)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let professional = Professionals::new(&mut conn)
        .get_by_id(professional_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Professional".to_string(),
            id: professional_id.to_string(),
        })?;
    permissions::require_owner(&current_user, professional.user_id, Resource::Images, Operation::CreateOwn)?;

    let upload = read_image_form(multipart, state.config.limits.max_upload_bytes).await?;
    let key = storage::image_key(professional_id, &upload.content_type);
    let url = store.put(&key, &upload.content_type, upload.data).await?;

    let updated = Professionals::new(&mut conn)
        .update(
            professional_id,
            &ProfessionalUpdateDBRequest {
                profile_image_url: Some(url.clone()),
                ..Default::default()
            },
        )
        .await;
    if let Err(e) = updated {
        discard(store.as_ref(), &key).await;
        return Err(e.into());
    }

    if let Some(old_key) = professional.profile_image_url.as_deref().and_then(storage::key_from_url) {
        discard(store.as_ref(), old_key).await;
    }
    info!(professional_id = %professional_id, "Profile image replaced");

    Ok(Json(ProfileImageResponse {
        professional_id,
        profile_image_url: url,
    }))
}

#[utoipa::path(
    get,
    path = "/upload-img/{professional_id}/images",
    tag = "uploads",
    summary = "List gallery images",
    params(("professional_id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 200, description = "Gallery images, oldest first", body = Vec<ImageResponse>),
        (status = 404, description = "Professional not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_images(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
) -> Result<Json<Vec<ImageResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    professional_owner(&mut conn, professional_id).await?;
    let images = Images::new(&mut conn).list_for_professional(professional_id).await?;
    Ok(Json(images.into_iter().map(ImageResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/upload-img/{professional_id}/images",
    tag = "uploads",
    summary = "Upload gallery image",
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    params(("professional_id" = uuid::Uuid, Path, description = "Professional ID")),
    responses(
        (status = 201, description = "Image stored", body = ImageResponse),
        (status = 400, description = "Missing file or unsupported content type"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Professional not found"),
        (status = 409, description = "Gallery is full"),
        (status = 413, description = "Image too large"),
        (status = 503, description = "Uploads not configured"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_image(
    State(state): State<AppState>,
    Path(professional_id): Path<ProfessionalId>,
    current_user: RequiresPermission<resource::Images, operation::CreateOwn>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImageResponse>)> {
    let store = image_store(&state)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let owner_id = professional_owner(&mut conn, professional_id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Images, Operation::CreateOwn)?;

    let limit = state.config.limits.max_images_per_professional;
    if Images::new(&mut conn).count_for_professional(professional_id).await? >= limit {
        return Err(Error::Conflict {
            message: format!("A professional can have at most {limit} gallery images"),
        });
    }

    let upload = read_image_form(multipart, state.config.limits.max_upload_bytes).await?;
    let key = storage::image_key(professional_id, &upload.content_type);
    let size_bytes = upload.data.len() as i64;
    let url = store.put(&key, &upload.content_type, upload.data).await?;

    let created = Images::new(&mut conn)
        .create(&ImageCreateDBRequest {
            professional_id,
            url,
            storage_key: key.clone(),
            description: upload.description,
            content_type: upload.content_type,
            size_bytes,
        })
        .await;
    match created {
        Ok(image) => Ok((StatusCode::CREATED, Json(image.into()))),
        Err(e) => {
            discard(store.as_ref(), &key).await;
            Err(e.into())
        }
    }
}

#[utoipa::path(
    delete,
    path = "/upload-img/images/{image_id}",
    tag = "uploads",
    summary = "Delete gallery image",
    params(("image_id" = uuid::Uuid, Path, description = "Image ID")),
    responses(
        (status = 204, description = "Image deleted"),
        (status = 403, description = "Not the professional's owner"),
        (status = 404, description = "Image not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<ImageId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let not_found = || Error::NotFound {
        resource: "Image".to_string(),
        id: image_id.to_string(),
    };
    let image = Images::new(&mut conn).get_by_id(image_id).await?.ok_or_else(not_found)?;
    let owner_id = professional_owner(&mut conn, image.professional_id).await?;
    permissions::require_owner(&current_user, owner_id, Resource::Images, Operation::DeleteOwn)?;

    let deleted = Images::new(&mut conn).delete(image_id).await?.ok_or_else(not_found)?;
    if let Some(store) = &state.storage {
        discard(store.as_ref(), &deleted.storage_key).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Serve images kept in local storage. S3-backed deployments link to the bucket instead.
#[tracing::instrument(skip_all)]
pub async fn serve_upload(State(state): State<AppState>, Path(key): Path<String>) -> Result<impl IntoResponse> {
    let not_found = || Error::NotFound {
        resource: "Upload".to_string(),
        id: key.clone(),
    };
    let StorageConfig::Local { path } = &state.config.storage else {
        return Err(not_found());
    };
    storage::validate_key(&key).map_err(|_| not_found())?;

    let data = match tokio::fs::read(std::path::Path::new(path).join(&key)).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            return Err(Error::Internal {
                operation: format!("read upload: {e}"),
            });
        }
    };
    let content_type = mime_guess::from_path(&key).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, content_type.to_string())], data))
}
