//! Database repository for reservations.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::reservations::{
            ReservationCreateDBRequest, ReservationDBResponse, ReservationFilter, ReservationUpdateDBRequest,
        },
    },
    types::{ProfessionalId, ReservationId, abbrev_uuid},
};

const RESERVATION_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.professional_id, r.service_id, r.date, r.start_time, r.status, r.notes,
           s.name AS service_name, pu.display_name AS professional_name, cu.display_name AS customer_name,
           p.user_id AS professional_user_id, r.created_at, r.updated_at
    FROM reservations r
    JOIN services s ON s.id = r.service_id
    JOIN professionals p ON p.id = r.professional_id
    JOIN users pu ON pu.id = p.user_id
    JOIN users cu ON cu.id = r.user_id
"#;

const COUNT_FROM: &str = "SELECT COUNT(*) FROM reservations r JOIN professionals p ON p.id = r.professional_id";

/// Statuses that hold a professional's slot; keep in sync with `ReservationStatus::ACTIVE`
const ACTIVE_STATUSES_SQL: &str = "('pending', 'confirmed', 'rescheduled')";

fn push_reservation_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ReservationFilter) {
    if let Some(user_id) = filter.user_id {
        query.push(" AND r.user_id = ");
        query.push_bind(user_id);
    }
    if let Some(professional_id) = filter.professional_id {
        query.push(" AND r.professional_id = ");
        query.push_bind(professional_id);
    }
    if let Some(participant) = filter.participant {
        query.push(" AND (r.user_id = ");
        query.push_bind(participant);
        query.push(" OR p.user_id = ");
        query.push_bind(participant);
        query.push(")");
    }
    if let Some(status) = filter.status {
        query.push(" AND r.status = ");
        query.push_bind(status);
    }
    if let Some(from) = filter.from {
        query.push(" AND r.date >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND r.date <= ");
        query.push_bind(to);
    }
}

pub struct Reservations<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Reservations<'c> {
    type CreateRequest = ReservationCreateDBRequest;
    type UpdateRequest = ReservationUpdateDBRequest;
    type Response = ReservationDBResponse;
    type Id = ReservationId;
    type Filter = ReservationFilter;

    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id), date = %request.date), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, professional_id, service_id, date, start_time, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(request.user_id)
        .bind(request.professional_id)
        .bind(request.service_id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(&request.notes)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(reservation_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(&format!("{RESERVATION_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(reservation)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let reservations =
            sqlx::query_as::<_, ReservationDBResponse>(&format!("{RESERVATION_SELECT} WHERE r.id = ANY($1)"))
                .bind(&ids)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(reservations.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{RESERVATION_SELECT} WHERE 1=1"));
        push_reservation_filters(&mut query, filter);

        query.push(" ORDER BY r.date DESC, r.start_time DESC NULLS LAST, r.created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let reservations = query.build_query_as::<ReservationDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(reservations)
    }

    #[instrument(skip(self), fields(reservation_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(reservation_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE reservations SET
                date = COALESCE($2, date),
                start_time = COALESCE($3, start_time),
                status = COALESCE($4, status),
                notes = COALESCE($5, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(request.status)
        .bind(&request.notes)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Reservations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ReservationFilter) -> Result<i64> {
        let mut query = QueryBuilder::new(format!("{COUNT_FROM} WHERE 1=1"));
        push_reservation_filters(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Find an active reservation holding the same professional, date and start time.
    /// Reservations without a start time only clash with other untimed reservations.
    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id), date = %date), err)]
    pub async fn find_conflict(
        &mut self,
        professional_id: ProfessionalId,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
        exclude: Option<ReservationId>,
    ) -> Result<Option<ReservationId>> {
        let conflict: Option<(ReservationId,)> = sqlx::query_as(&format!(
            r#"
            SELECT id FROM reservations
            WHERE professional_id = $1
              AND date = $2
              AND start_time IS NOT DISTINCT FROM $3
              AND status IN {ACTIVE_STATUSES_SQL}
              AND ($4::uuid IS NULL OR id <> $4)
            LIMIT 1
            "#
        ))
        .bind(professional_id)
        .bind(date)
        .bind(start_time)
        .bind(exclude)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(conflict.map(|(id,)| id))
    }

    /// Lock a reservation row for the rest of the transaction
    #[instrument(skip(self), fields(reservation_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: ReservationId) -> Result<bool> {
        let row: Option<(ReservationId,)> = sqlx::query_as("SELECT id FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::reservations::ReservationStatus;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_professional, create_test_service, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_get_round_trip(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let professional = create_test_professional(&pool).await;
        let service = create_test_service(&pool, professional.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let created = repo
            .create(&ReservationCreateDBRequest {
                user_id: customer.id,
                professional_id: professional.id,
                service_id: service.id,
                date,
                start_time: NaiveTime::from_hms_opt(10, 0, 0),
                notes: Some("Ring twice".to_string()),
            })
            .await
            .unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.date, date);
        assert_eq!(fetched.status, ReservationStatus::Pending);
        assert_eq!(fetched.user_id, customer.id);
        assert_eq!(fetched.professional_id, professional.id);
        assert_eq!(fetched.professional_user_id, professional.user_id);
        assert_eq!(fetched.service_name.as_deref(), Some(service.name.as_str()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_conflict_detection_ignores_inactive(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let professional = create_test_professional(&pool).await;
        let service = create_test_service(&pool, professional.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0);
        let created = repo
            .create(&ReservationCreateDBRequest {
                user_id: customer.id,
                professional_id: professional.id,
                service_id: service.id,
                date,
                start_time: ten,
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(repo.find_conflict(professional.id, date, ten, None).await.unwrap(), Some(created.id));
        assert_eq!(repo.find_conflict(professional.id, date, ten, Some(created.id)).await.unwrap(), None);
        assert_eq!(
            repo.find_conflict(professional.id, date, NaiveTime::from_hms_opt(11, 0, 0), None).await.unwrap(),
            None
        );
        assert_eq!(repo.find_conflict(professional.id, date, None, None).await.unwrap(), None);

        repo.update(
            created.id,
            &ReservationUpdateDBRequest {
                status: Some(ReservationStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.find_conflict(professional.id, date, ten, None).await.unwrap(), None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_participant_filter_and_delete(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let other = create_test_user(&pool, Role::Customer).await;
        let professional = create_test_professional(&pool).await;
        let service = create_test_service(&pool, professional.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        let created = repo
            .create(&ReservationCreateDBRequest {
                user_id: customer.id,
                professional_id: professional.id,
                service_id: service.id,
                date: NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(),
                start_time: None,
                notes: None,
            })
            .await
            .unwrap();

        for (participant, expected) in [(customer.id, 1), (professional.user_id, 1), (other.id, 0)] {
            let filter = ReservationFilter {
                skip: 0,
                limit: 10,
                participant: Some(participant),
                ..Default::default()
            };
            assert_eq!(repo.list(&filter).await.unwrap().len(), expected);
            assert_eq!(repo.count(&filter).await.unwrap(), expected as i64);
        }

        assert!(repo.delete(created.id).await.unwrap());
        let filter = ReservationFilter {
            skip: 0,
            limit: 10,
            user_id: Some(customer.id),
            ..Default::default()
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
    }
}
