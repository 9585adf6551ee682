//! Database repository for availability slots.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgConnection, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::availability::{
            AvailabilityCreateDBRequest, AvailabilityDBResponse, AvailabilityFilter, AvailabilityUpdateDBRequest,
        },
    },
    types::{AvailabilityId, ProfessionalId, abbrev_uuid},
};

pub struct Availability<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Availability<'c> {
    type CreateRequest = AvailabilityCreateDBRequest;
    type UpdateRequest = AvailabilityUpdateDBRequest;
    type Response = AvailabilityDBResponse;
    type Id = AvailabilityId;
    type Filter = AvailabilityFilter;

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id), date = %request.date), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let slot = sqlx::query_as::<_, AvailabilityDBResponse>(
            r#"
            INSERT INTO availability (id, professional_id, date, start_time, end_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.professional_id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(request.end_time)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(slot)
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let slot = sqlx::query_as::<_, AvailabilityDBResponse>("SELECT * FROM availability WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(slot)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let slots = sqlx::query_as::<_, AvailabilityDBResponse>("SELECT * FROM availability WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(slots.into_iter().map(|s| (s.id, s)).collect())
    }

    /// Slots for one professional in date order, optionally bounded by a date window
    #[instrument(skip(self, filter), fields(professional_id = %abbrev_uuid(&filter.professional_id)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM availability WHERE professional_id = ");
        query.push_bind(filter.professional_id);

        if let Some(from) = filter.from {
            query.push(" AND date >= ");
            query.push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND date <= ");
            query.push_bind(to);
        }
        query.push(" ORDER BY date ASC, start_time ASC");

        let slots = query.build_query_as::<AvailabilityDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(slots)
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM availability WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let slot = sqlx::query_as::<_, AvailabilityDBResponse>(
            r#"
            UPDATE availability SET
                date = COALESCE($2, date),
                start_time = COALESCE($3, start_time),
                end_time = COALESCE($4, end_time),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(request.end_time)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(slot)
    }
}

impl<'c> Availability<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Find a slot on the same date whose time range overlaps `[start, end)`.
    /// Touching ranges (one ends when the next starts) do not overlap.
    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id), date = %date), err)]
    pub async fn find_overlap(
        &mut self,
        professional_id: ProfessionalId,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude: Option<AvailabilityId>,
    ) -> Result<Option<AvailabilityDBResponse>> {
        let slot = sqlx::query_as::<_, AvailabilityDBResponse>(
            r#"
            SELECT * FROM availability
            WHERE professional_id = $1
              AND date = $2
              AND start_time < $4
              AND end_time > $3
              AND ($5::uuid IS NULL OR id <> $5)
            ORDER BY start_time
            LIMIT 1
            "#,
        )
        .bind(professional_id)
        .bind(date)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_professional;
    use sqlx::PgPool;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_overlap_detection(pool: PgPool) {
        let professional = create_test_professional(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Availability::new(&mut conn);

        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let slot = repo
            .create(&AvailabilityCreateDBRequest {
                professional_id: professional.id,
                date,
                start_time: time(9, 0),
                end_time: time(12, 0),
            })
            .await
            .unwrap();

        assert!(repo.find_overlap(professional.id, date, time(11, 0), time(13, 0), None).await.unwrap().is_some());
        assert!(repo.find_overlap(professional.id, date, time(8, 0), time(9, 30), None).await.unwrap().is_some());
        // Touching ranges are fine
        assert!(repo.find_overlap(professional.id, date, time(12, 0), time(14, 0), None).await.unwrap().is_none());
        // Other dates are fine
        let next_day = date.succ_opt().unwrap();
        assert!(repo.find_overlap(professional.id, next_day, time(9, 0), time(12, 0), None).await.unwrap().is_none());
        // Editing the same slot doesn't clash with itself
        assert!(
            repo.find_overlap(professional.id, date, time(9, 0), time(13, 0), Some(slot.id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_end_before_start_is_check_violation(pool: PgPool) {
        let professional = create_test_professional(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Availability::new(&mut conn);

        let result = repo
            .create(&AvailabilityCreateDBRequest {
                professional_id: professional.id,
                date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                start_time: time(12, 0),
                end_time: time(9, 0),
            })
            .await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_window(pool: PgPool) {
        let professional = create_test_professional(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Availability::new(&mut conn);

        for day in 1..=3 {
            repo.create(&AvailabilityCreateDBRequest {
                professional_id: professional.id,
                date: NaiveDate::from_ymd_opt(2026, 7, day).unwrap(),
                start_time: time(9, 0),
                end_time: time(10, 0),
            })
            .await
            .unwrap();
        }

        let slots = repo
            .list(&AvailabilityFilter {
                professional_id: professional.id,
                from: NaiveDate::from_ymd_opt(2026, 7, 2),
                to: None,
            })
            .await
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0].date < slots[1].date);
    }
}
