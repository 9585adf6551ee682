//! Database repositories for subscriptions and payment records.
//!
//! Both are written from provider webhooks and checkout confirmations, which may
//! be delivered more than once, so every write is an idempotent upsert.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::payments::SubscriptionStatus,
    db::{
        errors::Result,
        models::payments::{PaymentDBResponse, PaymentUpsertDBRequest, SubscriptionDBResponse, SubscriptionUpsertDBRequest},
    },
    types::{ProfessionalId, UserId, abbrev_uuid},
};

pub struct Subscriptions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Subscriptions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert or replace the professional's subscription. A professional holds at most one
    /// subscription, so re-subscribing overwrites the provider identifiers.
    #[instrument(skip(self, request), fields(professional_id = %abbrev_uuid(&request.professional_id), status = ?request.status), err)]
    pub async fn upsert(&mut self, request: &SubscriptionUpsertDBRequest) -> Result<SubscriptionDBResponse> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            INSERT INTO subscriptions (id, professional_id, provider, provider_subscription_id, provider_customer_id, status, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT subscriptions_professional_id_unique DO UPDATE SET
                provider = EXCLUDED.provider,
                provider_subscription_id = EXCLUDED.provider_subscription_id,
                provider_customer_id = COALESCE(EXCLUDED.provider_customer_id, subscriptions.provider_customer_id),
                status = EXCLUDED.status,
                current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.professional_id)
        .bind(&request.provider)
        .bind(&request.provider_subscription_id)
        .bind(&request.provider_customer_id)
        .bind(request.status)
        .bind(request.current_period_end)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    /// Apply a status change reported by the provider. Returns `None` for subscriptions
    /// this system never recorded.
    #[instrument(skip(self), err)]
    pub async fn update_status_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            UPDATE subscriptions SET
                status = $2,
                current_period_end = COALESCE($3, current_period_end),
                updated_at = NOW()
            WHERE provider_subscription_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_subscription_id)
        .bind(status)
        .bind(current_period_end)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), fields(professional_id = %abbrev_uuid(&professional_id)), err)]
    pub async fn get_by_professional(&mut self, professional_id: ProfessionalId) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE professional_id = $1")
            .bind(professional_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_provider_id(&mut self, provider_subscription_id: &str) -> Result<Option<SubscriptionDBResponse>> {
        let subscription =
            sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE provider_subscription_id = $1")
                .bind(provider_subscription_id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(subscription)
    }
}

pub struct Payments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Payments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a payment, or update its status if the provider reference was already seen
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), status = ?request.status), err)]
    pub async fn upsert(&mut self, request: &PaymentUpsertDBRequest) -> Result<PaymentDBResponse> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            INSERT INTO payments (id, user_id, provider, provider_reference, amount, currency, status, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT payments_provider_reference_unique DO UPDATE SET
                status = EXCLUDED.status,
                amount = EXCLUDED.amount,
                description = COALESCE(EXCLUDED.description, payments.description),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.provider)
        .bind(&request.provider_reference)
        .bind(request.amount)
        .bind(request.currency.to_lowercase())
        .bind(request.status)
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(payment)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<PaymentDBResponse>> {
        let payments = sqlx::query_as::<_, PaymentDBResponse>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(payments)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count.0)
    }
}
