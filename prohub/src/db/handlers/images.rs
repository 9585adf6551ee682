//! Database repository for uploaded professional images.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::Result,
        models::images::{ImageCreateDBRequest, ImageDBResponse},
    },
    types::{ImageId, ProfessionalId, abbrev_uuid},
};

pub struct Images<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Images<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id), size = request.size_bytes), err)]
    pub async fn create(&mut self, request: &ImageCreateDBRequest) -> Result<ImageDBResponse> {
        let image = sqlx::query_as::<_, ImageDBResponse>(
            r#"
            INSERT INTO uploaded_images (id, professional_id, url, storage_key, description, content_type, size_bytes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.professional_id)
        .bind(&request.url)
        .bind(&request.storage_key)
        .bind(&request.description)
        .bind(&request.content_type)
        .bind(request.size_bytes)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(image)
    }

    #[instrument(skip(self), fields(image_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: ImageId) -> Result<Option<ImageDBResponse>> {
        let image = sqlx::query_as::<_, ImageDBResponse>("SELECT * FROM uploaded_images WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(image)
    }

    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id)), err)]
    pub async fn list_for_professional(&mut self, professional_id: ProfessionalId) -> Result<Vec<ImageDBResponse>> {
        let images = sqlx::query_as::<_, ImageDBResponse>(
            "SELECT * FROM uploaded_images WHERE professional_id = $1 ORDER BY created_at DESC",
        )
        .bind(professional_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(images)
    }

    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id)), err)]
    pub async fn count_for_professional(&mut self, professional_id: ProfessionalId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM uploaded_images WHERE professional_id = $1")
            .bind(professional_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count.0)
    }

    /// Delete the record, returning it so the stored object can be removed too
    #[instrument(skip(self), fields(image_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: ImageId) -> Result<Option<ImageDBResponse>> {
        let image = sqlx::query_as::<_, ImageDBResponse>("DELETE FROM uploaded_images WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(image)
    }
}
